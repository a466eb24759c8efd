//! Headless Chromium backend driven over the DevTools protocol.
//!
//! Each context is one browser process with a private profile directory and a
//! single page, reused across renders when the pool allows it. Per render:
//!
//! - `load` writes the markup into the page with `document.write`, without
//!   waiting for any subresource;
//! - `wait_for_quiescence` resolves only after the `load` event,
//!   `document.fonts.ready` and every pending `<img>` have finished. The engine
//!   bounds it, so a document that never settles ends in `RenderTimeoutError`
//!   and is never printed half-loaded;
//! - `print` issues `Page.printToPDF` with the paper size, margins and
//!   background setting from [`PageOptions`].
//!
//! ## Requirements
//!
//! - A Chromium or Chrome binary (configurable path, default `chromium`).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use futures::StreamExt;
use tempfile::TempDir;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::debug;

use nightshift_core::{PipelineError, PipelineResult};

use crate::context::{RenderBackend, RenderContext};
use crate::options::PageOptions;

const PDF_SIGNATURE: &[u8] = b"%PDF-";
const MM_PER_INCH: f64 = 25.4;

/// Resolves `true` once the written document and everything it pulls in has loaded.
const SETTLE_SCRIPT: &str = r#"(async () => {
  if (document.readyState !== "complete") {
    await new Promise((resolve) => window.addEventListener("load", resolve, { once: true }));
  }
  await document.fonts.ready;
  await Promise.all(Array.from(document.images, (img) => img.complete ? null : new Promise((resolve) => {
    img.addEventListener("load", resolve, { once: true });
    img.addEventListener("error", resolve, { once: true });
  })));
  return true;
})()"#;

/// Configuration for the Chromium backend.
#[derive(Debug, Clone)]
pub struct ChromiumConfig {
    /// Path to the browser executable (default: "chromium" - uses PATH).
    pub binary: PathBuf,
    /// Pass `--no-sandbox` (needed when running as root in containers).
    pub no_sandbox: bool,
    /// Parent directory for per-context profiles (default: system temp).
    pub work_dir: Option<PathBuf>,
    /// Extra command-line switches appended verbatim.
    pub extra_args: Vec<String>,
}

impl Default for ChromiumConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("chromium"),
            no_sandbox: true,
            work_dir: None,
            extra_args: Vec::new(),
        }
    }
}

/// Launches [`ChromiumContext`]s.
#[derive(Debug, Clone)]
pub struct ChromiumBackend {
    config: Arc<ChromiumConfig>,
    version: Arc<OnceCell<String>>,
}

impl ChromiumBackend {
    pub fn new(config: ChromiumConfig) -> Self {
        Self {
            config: Arc::new(config),
            version: Arc::new(OnceCell::new()),
        }
    }

    pub fn config(&self) -> &ChromiumConfig {
        &self.config
    }

    /// Browser version string; fails if the binary cannot run.
    ///
    /// The binary is asked once per backend; later calls return the cached
    /// answer. Failures are not cached.
    pub async fn version(&self) -> PipelineResult<&str> {
        self.version
            .get_or_try_init(|| read_version(&self.config.binary))
            .await
            .map(String::as_str)
    }

    fn create_profile(&self) -> PipelineResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("nightshift-chromium-");
        let dir = match &self.config.work_dir {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        };
        dir.map_err(|e| {
            PipelineError::render_environment(format!("cannot create browser profile: {e}"))
        })
    }
}

#[async_trait]
impl RenderBackend for ChromiumBackend {
    fn name(&self) -> &'static str {
        "chromium"
    }

    async fn launch(&self) -> PipelineResult<Box<dyn RenderContext>> {
        let profile = self.create_profile()?;
        let config = browser_config(&self.config, profile.path())?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            PipelineError::render_environment(format!(
                "cannot launch {}: {e}",
                self.config.binary.display()
            ))
        })?;

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "devtools event error");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                events.abort();
                return Err(PipelineError::render_environment(format!(
                    "cannot open browser page: {e}"
                )));
            }
        };

        debug!(profile = %profile.path().display(), "launched chromium context");

        Ok(Box::new(ChromiumContext {
            page,
            browser,
            events,
            _profile: profile,
            options: PageOptions::default(),
            state: RenderState::default(),
        }))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Empty,
    Loaded,
    Settled,
}

/// Per-render progress of a context.
///
/// A failure at any step marks the context unhealthy, and `reset` never
/// restores health, so a context that misbehaved once is discarded by the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RenderState {
    phase: Phase,
    healthy: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            phase: Phase::Empty,
            healthy: true,
        }
    }
}

impl RenderState {
    fn require(&self, phase: Phase) -> PipelineResult<()> {
        if self.phase == phase {
            return Ok(());
        }
        Err(PipelineError::render_environment(match phase {
            Phase::Empty => "context still holds a document",
            Phase::Loaded => "no document loaded",
            Phase::Settled => "document has not settled yet",
        }))
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        self.healthy = false;
        self.phase = Phase::Empty;
        err
    }

    fn reset(&mut self) {
        self.phase = Phase::Empty;
    }
}

/// One browser process, its profile directory and the page renders go through.
pub struct ChromiumContext {
    page: Page,
    browser: Browser,
    events: JoinHandle<()>,
    _profile: TempDir,
    options: PageOptions,
    state: RenderState,
}

impl core::fmt::Debug for ChromiumContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChromiumContext")
            .field("profile", &self._profile.path())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ChromiumContext {
    fn environment_failure(&mut self, what: &str, err: CdpError) -> PipelineError {
        let mapped = match err {
            CdpError::Timeout => PipelineError::render_timeout(format!("{what}: devtools request timed out")),
            other => PipelineError::render_environment(format!("{what}: {other}")),
        };
        self.state.fail(mapped)
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn load(&mut self, markup: &str, options: &PageOptions) -> PipelineResult<()> {
        self.state.require(Phase::Empty)?;

        let script = match write_document_script(&inject_print_css(markup, &options.print_css())) {
            Ok(script) => script,
            Err(e) => return Err(self.state.fail(e)),
        };
        if let Err(e) = self.page.evaluate_expression(script).await {
            return Err(self.environment_failure("cannot load document", e));
        }

        self.options = *options;
        self.state.phase = Phase::Loaded;
        Ok(())
    }

    async fn wait_for_quiescence(&mut self) -> PipelineResult<()> {
        self.state.require(Phase::Loaded)?;

        let params = EvaluateParams::builder()
            .expression(SETTLE_SCRIPT)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(PipelineError::render_environment)?;

        let settled = match self.page.evaluate_expression(params).await {
            Ok(result) => result.into_value::<bool>().unwrap_or(false),
            Err(e) => return Err(self.environment_failure("settle check failed", e)),
        };
        if !settled {
            return Err(self.state.fail(PipelineError::render_environment(
                "document did not report settled",
            )));
        }

        self.state.phase = Phase::Settled;
        Ok(())
    }

    async fn print(&mut self) -> PipelineResult<Vec<u8>> {
        self.state.require(Phase::Settled)?;

        let bytes = match self.page.pdf(pdf_params(&self.options)).await {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.environment_failure("printToPDF failed", e)),
        };
        if !bytes.starts_with(PDF_SIGNATURE) {
            return Err(self.state.fail(PipelineError::render_environment(
                "chromium output is not a PDF document",
            )));
        }

        Ok(bytes)
    }

    fn is_healthy(&self) -> bool {
        self.state.healthy
    }

    fn reset(&mut self) {
        self.state.reset();
    }
}

impl Drop for ChromiumContext {
    fn drop(&mut self) {
        // The browser process is killed by `Browser`'s own drop.
        self.events.abort();
    }
}

fn browser_config(config: &ChromiumConfig, profile: &Path) -> PipelineResult<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(&config.binary)
        .user_data_dir(profile)
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        .arg("--no-pdf-header-footer");
    if config.no_sandbox {
        builder = builder.no_sandbox();
    }
    for arg in &config.extra_args {
        builder = builder.arg(arg.clone());
    }
    builder.build().map_err(PipelineError::render_environment)
}

fn pdf_params(options: &PageOptions) -> PrintToPdfParams {
    let (width, height) = options.format.size_mm();
    let m = &options.margins;
    PrintToPdfParams {
        print_background: Some(options.print_background),
        paper_width: Some(inches(width)),
        paper_height: Some(inches(height)),
        margin_top: Some(inches(m.top_mm)),
        margin_right: Some(inches(m.right_mm)),
        margin_bottom: Some(inches(m.bottom_mm)),
        margin_left: Some(inches(m.left_mm)),
        display_header_footer: Some(false),
        prefer_css_page_size: Some(true),
        ..PrintToPdfParams::default()
    }
}

fn inches(mm: f32) -> f64 {
    f64::from(mm) / MM_PER_INCH
}

/// Script replacing the page's document with `document`.
fn write_document_script(document: &str) -> PipelineResult<String> {
    let literal = serde_json::to_string(document)
        .map_err(|e| PipelineError::render_environment(format!("cannot encode document: {e}")))?;
    Ok(format!(
        "document.open(); document.write({literal}); document.close(); true"
    ))
}

/// Put the print stylesheet last in `<head>` so it wins over template rules.
fn inject_print_css(markup: &str, css: &str) -> String {
    let style = format!("<style data-print-layout>\n{css}\n</style>\n");
    let lower = markup.to_ascii_lowercase();

    let at = lower.find("</head>").or_else(|| lower.find("<body"));
    match at {
        Some(idx) => {
            let mut out = String::with_capacity(markup.len() + style.len());
            out.push_str(&markup[..idx]);
            out.push_str(&style);
            out.push_str(&markup[idx..]);
            out
        }
        None => format!("{style}{markup}"),
    }
}

async fn read_version(binary: &Path) -> PipelineResult<String> {
    let output = Command::new(binary)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            PipelineError::render_environment(format!("cannot run {}: {e}", binary.display()))
        })?;

    if !output.status.success() {
        return Err(PipelineError::render_environment(format!(
            "{} --version exited with {}: {}",
            binary.display(),
            output.status,
            tail(&output.stderr)
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn tail(stderr: &[u8]) -> String {
    const MAX: usize = 400;
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    match text.char_indices().rev().nth(MAX) {
        Some((idx, _)) => format!("...{}", &text[idx..]),
        None => text.to_string(),
    }
}
