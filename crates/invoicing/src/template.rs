//! Invoice template asset: loading and placeholder validation.
//!
//! A template is HTML with handlebars placeholders drawn from a fixed token
//! set ([`Placeholder`]). Scalar tokens are written `{{orderId}}` and are
//! HTML-escaped on output; the two fragment tokens carry markup built from
//! escaped values and are written raw, `{{{items}}}` and `{{{notesSection}}}`.
//! Anything else (unknown names, helpers, blocks, partials) is rejected when
//! the template is compiled.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use handlebars::Handlebars;
use handlebars::template::{HelperTemplate, Template as Compiled, TemplateElement};
use serde_json::Value;

use nightshift_core::{PipelineError, PipelineResult};

/// Version of the placeholder token set understood by this crate.
pub const PLACEHOLDER_SET_VERSION: u32 = 2;

/// Default invoice template compiled into the binary.
pub const EMBEDDED_INVOICE_TEMPLATE: &str = include_str!("../assets/invoice.html");

const ITEM_ROWS_TEMPLATE: &str = include_str!("../assets/item_rows.hbs");
const NOTES_SECTION_TEMPLATE: &str = include_str!("../assets/notes_section.hbs");

/// Placeholder tokens a template may reference.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Placeholder {
    OrganizationName,
    CustomerId,
    CustomerName,
    EmployeeId,
    EmployeeName,
    OrderId,
    OrderDate,
    Deadline,
    Items,
    TotalAmount,
    NotesSection,
}

impl Placeholder {
    pub const ALL: [Placeholder; 11] = [
        Placeholder::OrganizationName,
        Placeholder::CustomerId,
        Placeholder::CustomerName,
        Placeholder::EmployeeId,
        Placeholder::EmployeeName,
        Placeholder::OrderId,
        Placeholder::OrderDate,
        Placeholder::Deadline,
        Placeholder::Items,
        Placeholder::TotalAmount,
        Placeholder::NotesSection,
    ];

    /// Token name as written between the braces.
    pub fn token(self) -> &'static str {
        match self {
            Placeholder::OrganizationName => "organizationName",
            Placeholder::CustomerId => "customerId",
            Placeholder::CustomerName => "customerName",
            Placeholder::EmployeeId => "employeeId",
            Placeholder::EmployeeName => "employeeName",
            Placeholder::OrderId => "orderId",
            Placeholder::OrderDate => "orderDate",
            Placeholder::Deadline => "deadline",
            Placeholder::Items => "items",
            Placeholder::TotalAmount => "totalAmount",
            Placeholder::NotesSection => "notesSection",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.token() == token)
    }

    /// Fragment tokens expand to generated markup and must be written raw.
    pub fn is_fragment(self) -> bool {
        matches!(self, Placeholder::Items | Placeholder::NotesSection)
    }
}

impl core::fmt::Display for Placeholder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_fragment() {
            write!(f, "{{{{{{{}}}}}}}", self.token())
        } else {
            write!(f, "{{{{{}}}}}", self.token())
        }
    }
}

/// Named templates held by every compiled [`Template`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Part {
    Document,
    ItemRows,
    NotesSection,
}

impl Part {
    fn name(self) -> &'static str {
        match self {
            Part::Document => "invoice",
            Part::ItemRows => "invoice/item_rows",
            Part::NotesSection => "invoice/notes_section",
        }
    }
}

/// Compiled, validated template.
///
/// Owns a strict-mode handlebars registry with the document registered under
/// one name next to the row and notes fragments.
#[derive(Clone)]
pub struct Template {
    name: String,
    placeholders: Vec<Placeholder>,
    registry: Handlebars<'static>,
}

impl core::fmt::Debug for Template {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("placeholders", &self.placeholders)
            .finish_non_exhaustive()
    }
}

impl Template {
    /// Compile markup, rejecting syntax errors and anything outside the token set.
    pub fn parse(name: impl Into<String>, markup: &str) -> PipelineResult<Self> {
        let name = name.into();
        let compiled = Compiled::compile(markup)
            .map_err(|e| PipelineError::composition(format!("{name}: {e}")))?;
        let placeholders = placeholders_of(&name, &compiled)?;

        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_template(Part::Document.name(), compiled);
        for (part, source) in [
            (Part::ItemRows, ITEM_ROWS_TEMPLATE),
            (Part::NotesSection, NOTES_SECTION_TEMPLATE),
        ] {
            registry
                .register_template_string(part.name(), source)
                .map_err(|e| PipelineError::composition(format!("{}: {e}", part.name())))?;
        }

        Ok(Self {
            name,
            placeholders,
            registry,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Placeholders in document order (repeats included).
    pub fn placeholders(&self) -> impl Iterator<Item = Placeholder> + '_ {
        self.placeholders.iter().copied()
    }

    pub(crate) fn render(&self, part: Part, data: &Value) -> PipelineResult<String> {
        self.registry
            .render(part.name(), data)
            .map_err(|e| PipelineError::composition(format!("{}: {e}", self.name)))
    }
}

fn placeholders_of(name: &str, compiled: &Compiled) -> PipelineResult<Vec<Placeholder>> {
    let mut found = Vec::new();

    for element in &compiled.elements {
        let (expr, raw) = match element {
            TemplateElement::RawString(_) | TemplateElement::Comment(_) => continue,
            TemplateElement::Expression(expr) => (expr, false),
            TemplateElement::HtmlExpression(expr) => (expr, true),
            _ => {
                return Err(PipelineError::composition(format!(
                    "{name}: only placeholders are supported, found a block, partial or decorator"
                )));
            }
        };

        let placeholder = resolve(name, expr)?;
        if placeholder.is_fragment() != raw {
            return Err(PipelineError::composition(format!(
                "{name}: placeholder `{}` must be written as {placeholder}",
                placeholder.token()
            )));
        }
        found.push(placeholder);
    }

    Ok(found)
}

fn resolve(name: &str, expr: &HelperTemplate) -> PipelineResult<Placeholder> {
    let token = expr.name.as_name().unwrap_or_default();
    if !expr.params.is_empty() || !expr.hash.is_empty() {
        return Err(PipelineError::composition(format!(
            "{name}: helper calls are not supported (`{token}`)"
        )));
    }
    Placeholder::from_token(token).ok_or_else(|| {
        PipelineError::composition(format!("{name}: unknown placeholder `{{{{{token}}}}}`"))
    })
}

#[derive(Debug, Clone)]
enum Source {
    Static,
    File { path: PathBuf, reload: bool },
}

/// Source of the invoice template for the pipeline.
///
/// Static and non-reloading file stores compile once and hand out a shared
/// `Arc<Template>`; a reloading file store re-reads the asset on every
/// [`TemplateStore::load`] so edits show up without a restart.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    source: Source,
    cached: Arc<Template>,
}

impl TemplateStore {
    /// Store backed by the template compiled into the binary.
    pub fn embedded() -> PipelineResult<Self> {
        Self::from_markup("embedded:invoice.html", EMBEDDED_INVOICE_TEMPLATE)
    }

    /// Store backed by in-memory markup.
    pub fn from_markup(name: impl Into<String>, markup: &str) -> PipelineResult<Self> {
        Ok(Self {
            source: Source::Static,
            cached: Arc::new(Template::parse(name, markup)?),
        })
    }

    /// Store backed by a file on disk. The file is read (and validated) immediately.
    pub fn from_file(path: impl Into<PathBuf>, reload: bool) -> PipelineResult<Self> {
        let path = path.into();
        let cached = Arc::new(read_template(&path)?);
        tracing::info!(
            template = %path.display(),
            reload,
            placeholders = cached.placeholders().count(),
            "loaded invoice template"
        );
        Ok(Self {
            source: Source::File { path, reload },
            cached,
        })
    }

    /// Current template.
    pub fn load(&self) -> PipelineResult<Arc<Template>> {
        match &self.source {
            Source::File { path, reload: true } => Ok(Arc::new(read_template(path)?)),
            _ => Ok(Arc::clone(&self.cached)),
        }
    }

    pub fn name(&self) -> &str {
        self.cached.name()
    }
}

fn read_template(path: &Path) -> PipelineResult<Template> {
    let markup = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::composition(format!("cannot read template {}: {e}", path.display()))
    })?;
    Template::parse(path.display().to_string(), &markup)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_err(markup: &str) -> String {
        let err = Template::parse("t", markup).unwrap_err();
        assert_eq!(err.kind(), "CompositionError");
        err.to_string()
    }

    #[test]
    fn every_token_round_trips() {
        for p in Placeholder::ALL {
            assert_eq!(Placeholder::from_token(p.token()), Some(p));
        }
        assert_eq!(Placeholder::from_token("total"), None);
        assert_eq!(Placeholder::OrderId.to_string(), "{{orderId}}");
        assert_eq!(Placeholder::Items.to_string(), "{{{items}}}");
    }

    #[test]
    fn placeholders_are_listed_in_document_order() {
        let t = Template::parse("t", "<h1>{{orderId}}</h1>{{{ items }}}<p>{{orderId}}</p>").unwrap();
        assert_eq!(
            t.placeholders().collect::<Vec<_>>(),
            vec![Placeholder::OrderId, Placeholder::Items, Placeholder::OrderId]
        );
    }

    #[test]
    fn single_braces_are_literal() {
        let t = Template::parse("t", "<style>p { color: red; }</style>").unwrap();
        assert_eq!(t.placeholders().count(), 0);
    }

    #[test]
    fn unknown_placeholder_is_a_composition_error() {
        assert!(parse_err("<p>{{discount}}</p>").contains("{{discount}}"));
    }

    #[test]
    fn malformed_markup_is_a_composition_error() {
        assert!(parse_err("<p>{{orderId</p>").starts_with("template composition failed: t:"));
    }

    #[test]
    fn fragments_must_be_raw() {
        assert!(parse_err("<tbody>{{items}}</tbody>").contains("{{{items}}}"));
    }

    #[test]
    fn scalars_cannot_bypass_escaping() {
        assert!(parse_err("<p>{{{customerName}}}</p>").contains("{{customerName}}"));
    }

    #[test]
    fn blocks_and_helpers_are_rejected() {
        assert!(parse_err("{{#if deadline}}due {{deadline}}{{/if}}").contains("block"));
        assert!(parse_err("{{lookup orderId 0}}").contains("helper calls"));
        assert!(parse_err("{{> header}}").contains("partial"));
    }

    #[test]
    fn embedded_template_uses_every_placeholder() {
        let store = TemplateStore::embedded().unwrap();
        let template = store.load().unwrap();
        for p in Placeholder::ALL {
            assert!(
                template.placeholders().any(|q| q == p),
                "embedded template is missing {p}"
            );
        }
    }

    #[test]
    fn missing_file_is_a_composition_error() {
        let err = TemplateStore::from_file("/definitely/not/here.html", false).unwrap_err();
        assert_eq!(err.kind(), "CompositionError");
        assert!(err.to_string().contains("cannot read template"));
    }

    #[test]
    fn reloading_store_picks_up_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.html");
        std::fs::write(&path, "<p>{{orderId}}</p>").unwrap();

        let store = TemplateStore::from_file(&path, true).unwrap();
        assert_eq!(store.load().unwrap().placeholders().count(), 1);

        std::fs::write(&path, "<p>{{orderId}} {{deadline}}</p>").unwrap();
        assert_eq!(store.load().unwrap().placeholders().count(), 2);

        std::fs::write(&path, "<p>{{oops}}</p>").unwrap();
        assert_eq!(store.load().unwrap_err().kind(), "CompositionError");
    }

    #[test]
    fn cached_store_ignores_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.html");
        std::fs::write(&path, "<p>{{orderId}}</p>").unwrap();

        let store = TemplateStore::from_file(&path, false).unwrap();
        std::fs::write(&path, "<p>{{oops}}</p>").unwrap();
        assert!(store.load().is_ok());
    }
}
