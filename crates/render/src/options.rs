//! Fixed page layout for rendered documents.

/// Paper size.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum PaperFormat {
    #[default]
    A4,
    Letter,
}

impl PaperFormat {
    /// `(width, height)` in millimetres, portrait.
    pub fn size_mm(self) -> (f32, f32) {
        match self {
            PaperFormat::A4 => (210.0, 297.0),
            PaperFormat::Letter => (215.9, 279.4),
        }
    }
}

/// Page margins in millimetres.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Margins {
    pub top_mm: f32,
    pub right_mm: f32,
    pub bottom_mm: f32,
    pub left_mm: f32,
}

impl Margins {
    pub fn uniform(mm: f32) -> Self {
        Self {
            top_mm: mm,
            right_mm: mm,
            bottom_mm: mm,
            left_mm: mm,
        }
    }
}

/// Page layout passed to a renderer.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PageOptions {
    pub format: PaperFormat,
    pub margins: Margins,
    /// Keep background colours and images (branding).
    pub print_background: bool,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self::invoice()
    }
}

impl PageOptions {
    /// Invoice layout: A4, 10 mm margins, backgrounds kept.
    pub fn invoice() -> Self {
        Self {
            format: PaperFormat::A4,
            margins: Margins::uniform(10.0),
            print_background: true,
        }
    }

    /// Print stylesheet enforcing this layout.
    pub fn print_css(&self) -> String {
        let (width, height) = self.format.size_mm();
        let m = &self.margins;
        let mut css = format!(
            "@page {{ size: {width}mm {height}mm; margin: {}mm {}mm {}mm {}mm; }}",
            m.top_mm, m.right_mm, m.bottom_mm, m.left_mm
        );
        if self.print_background {
            css.push_str(
                "\nhtml, body { -webkit-print-color-adjust: exact; print-color-adjust: exact; }",
            );
        }
        css
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_layout_is_a4_with_uniform_margins() {
        let options = PageOptions::invoice();
        assert_eq!(options.format.size_mm(), (210.0, 297.0));
        assert_eq!(options.margins, Margins::uniform(10.0));
        assert!(options.print_background);
    }

    #[test]
    fn print_css_encodes_size_margins_and_backgrounds() {
        let css = PageOptions::invoice().print_css();
        assert!(css.contains("size: 210mm 297mm"));
        assert!(css.contains("margin: 10mm 10mm 10mm 10mm"));
        assert!(css.contains("print-color-adjust: exact"));

        let plain = PageOptions {
            print_background: false,
            ..PageOptions::invoice()
        };
        assert!(!plain.print_css().contains("color-adjust"));
    }
}
