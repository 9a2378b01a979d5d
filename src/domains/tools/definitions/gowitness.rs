//! gowitness adapter: web screenshots, reports and access to the captured
//! images. Screenshots this process reads back are subject to path
//! confinement.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::{CallToolResult, Content};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::common::{require_http_url, success_result};
use crate::core::config::SecurityConfig;
use crate::core::process::{CommandRunner, ExternalTool, SuccessPolicy};
use crate::core::security::confine_path;
use crate::domains::tools::ToolError;
use crate::domains::tools::route::tool_route;

const DEFAULT_SCREENSHOT_DIR: &str = "./screenshots";
const IMAGE_EXTENSIONS: [&str; 3] = ["jpeg", "jpg", "png"];

// ============================================================================
// Tool Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }
}

/// Browser and writer options shared by single and batch captures.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct CaptureOptions {
    /// Chrome browser window width in pixels (default 1920)
    pub chrome_window_x: Option<u32>,

    /// Chrome browser window height in pixels (default 1080)
    pub chrome_window_y: Option<u32>,

    /// Number of seconds before considering a page timed out (default 60)
    pub timeout: Option<u32>,

    /// Number of seconds delay between navigation and screenshotting (default 3)
    pub delay: Option<u32>,

    /// Number of concurrent threads (default 6)
    pub threads: Option<u32>,

    /// Screenshot format (default jpeg)
    pub format: Option<ImageFormat>,

    /// Write results to SQLite database
    #[serde(default)]
    pub write_db: bool,

    /// Write results as JSON lines
    #[serde(default)]
    pub write_jsonl: bool,
}

impl CaptureOptions {
    fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let numeric = [
            ("--chrome-window-x", self.chrome_window_x),
            ("--chrome-window-y", self.chrome_window_y),
            ("--timeout", self.timeout),
            ("--delay", self.delay),
            ("--threads", self.threads),
        ];
        for (flag, value) in numeric {
            if let Some(v) = value.filter(|v| *v > 0) {
                args.extend([flag.to_string(), v.to_string()]);
            }
        }
        if let Some(format) = self.format {
            args.extend(["--screenshot-format".to_string(), format.as_str().to_string()]);
        }
        if self.write_db {
            args.push("--write-db".to_string());
        }
        if self.write_jsonl {
            args.push("--write-jsonl".to_string());
        }
        // gowitness warns when no writer is selected.
        if !self.write_db && !self.write_jsonl {
            args.push("--write-none".to_string());
        }
        args
    }
}

/// Parameters for `gowitness-screenshot`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ScreenshotParams {
    /// URL to take a screenshot of
    pub url: String,

    /// Path to store screenshots (default ./screenshots)
    pub screenshot_path: Option<String>,

    /// If true, return the screenshot as image content
    #[serde(default)]
    pub return_binary: bool,

    /// Do full-page screenshots, instead of just the viewport
    #[serde(default)]
    pub fullpage: bool,

    /// Custom user-agent string
    pub user_agent: Option<String>,

    #[serde(flatten)]
    pub options: CaptureOptions,
}

/// Parameters for `gowitness-report`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReportParams {
    /// Path where gowitness stored screenshots
    pub screenshot_path: Option<String>,

    /// Database URI to generate report from (e.g., sqlite://gowitness.sqlite3)
    pub db_uri: Option<String>,
}

/// Parameters for `gowitness-batch-screenshot`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct BatchScreenshotParams {
    /// Array of URLs to screenshot
    pub urls: Vec<String>,

    /// Path to store screenshots
    pub screenshot_path: String,

    #[serde(flatten)]
    pub options: CaptureOptions,
}

/// Parameters for `gowitness-read-binary`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReadBinaryParams {
    /// Path to the screenshot file to read
    pub file_path: String,

    /// Directory to search for screenshot files (if file_path is a bare file name)
    pub screenshot_dir: Option<String>,
}

fn default_screenshot_dir() -> String {
    DEFAULT_SCREENSHOT_DIR.to_string()
}

/// Parameters for `gowitness-list-screenshots`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListScreenshotsParams {
    /// Directory to search for screenshots (default: ./screenshots)
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: String,
}

// ============================================================================
// Screenshot files
// ============================================================================

/// One image in a screenshot directory.
#[derive(Debug, Clone)]
struct ScreenshotFile {
    name: String,
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

fn is_image(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext))
}

fn mime_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

fn timestamp(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Image files in `dir`, newest first.
fn list_images(dir: &Path) -> Result<Vec<ScreenshotFile>, ToolError> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Error reading entry: {}", e);
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_image(&name) {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!("Failed to get metadata for {}: {}", name, e);
                continue;
            }
        };
        images.push(ScreenshotFile {
            name,
            path: entry.path(),
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    images.sort_by(|a, b| b.modified.cmp(&a.modified));
    Ok(images)
}

/// gowitness names files after the URL with punctuation replaced by `_`.
fn file_safe_hostname(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .map(|host| {
            host.chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect()
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Pick the capture for `url`: a file containing the whole hostname, then one
/// containing any hostname label, then the newest image.
fn locate_screenshot(images: &[ScreenshotFile], url: &str) -> Option<PathBuf> {
    let hostname = file_safe_hostname(url);
    let labels: Vec<&str> = hostname.split('_').filter(|p| !p.is_empty()).collect();

    images
        .iter()
        .find(|f| f.name.contains(&hostname))
        .or_else(|| {
            images
                .iter()
                .find(|f| labels.iter().any(|label| f.name.contains(label)))
        })
        .or_else(|| images.first())
        .map(|f| f.path.clone())
}

/// A bare file name is looked up in `dir`; anything with a separator is used as given.
fn resolve_screenshot_path(file_path: &str, dir: Option<&str>) -> PathBuf {
    match dir {
        Some(dir) if !file_path.contains(['/', '\\']) => Path::new(dir).join(file_path),
        _ => PathBuf::from(file_path),
    }
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct GowitnessTools {
    gowitness: ExternalTool,
    security: SecurityConfig,
}

impl GowitnessTools {
    pub const SCREENSHOT: &'static str = "gowitness-screenshot";
    pub const REPORT: &'static str = "gowitness-report";
    pub const BATCH_SCREENSHOT: &'static str = "gowitness-batch-screenshot";
    pub const READ_BINARY: &'static str = "gowitness-read-binary";
    pub const LIST_SCREENSHOTS: &'static str = "gowitness-list-screenshots";

    pub fn new(binary: PathBuf, runner: Arc<CommandRunner>, security: SecurityConfig) -> Self {
        Self::with_tool(
            ExternalTool::new(binary, SuccessPolicy::ExitCodeZero, runner),
            security,
        )
    }

    pub fn with_tool(gowitness: ExternalTool, security: SecurityConfig) -> Self {
        Self { gowitness, security }
    }

    /// Read a confined image and return it as text summary plus image content.
    fn image_result(
        &self,
        path: &Path,
        summary: impl FnOnce(usize, &Path) -> String,
    ) -> Result<CallToolResult, ToolError> {
        let path = confine_path(path, &self.security)?;
        let data = fs::read(&path)?;
        debug!(path = %path.display(), bytes = data.len(), "Read screenshot");
        Ok(CallToolResult::success(vec![
            Content::text(summary(data.len(), &path)),
            Content::image(STANDARD.encode(&data), mime_type(&path)),
        ]))
    }

    #[instrument(skip_all, fields(url = %params.url, return_binary = params.return_binary))]
    pub async fn screenshot(
        self: Arc<Self>,
        params: ScreenshotParams,
    ) -> Result<CallToolResult, ToolError> {
        require_http_url("url", &params.url)?;

        let mut args = vec![
            "scan".to_string(),
            "single".to_string(),
            "--url".to_string(),
            params.url.clone(),
        ];
        if let Some(path) = &params.screenshot_path {
            args.extend(["--screenshot-path".to_string(), path.clone()]);
        }
        if params.fullpage {
            args.push("--screenshot-fullpage".to_string());
        }
        if let Some(agent) = &params.user_agent {
            args.extend(["--chrome-user-agent".to_string(), agent.clone()]);
        }
        args.extend(params.options.args());

        let output = self.gowitness.run(args).await?;
        let dir = params
            .screenshot_path
            .clone()
            .unwrap_or_else(default_screenshot_dir);

        if params.return_binary {
            let images = list_images(Path::new(&dir))?;
            let path = locate_screenshot(&images, &params.url).ok_or_else(|| {
                ToolError::not_found(format!("no screenshot file in {dir} after gowitness run"))
            })?;
            return self.image_result(&path, |bytes, _| {
                format!("Screenshot captured successfully. Binary data size: {bytes} bytes")
            });
        }

        let text = format!(
            "{}\nGowitness screenshot completed successfully Screenshots saved to: {}",
            output.combined(),
            dir
        );
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all)]
    pub async fn report(
        self: Arc<Self>,
        params: ReportParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut args = vec!["report".to_string()];
        if let Some(path) = params.screenshot_path {
            args.extend(["--screenshot-path".to_string(), path]);
        }
        if let Some(uri) = params.db_uri {
            args.extend(["--write-db-uri".to_string(), uri]);
        }

        let output = self.gowitness.run(args).await?;
        let text = format!("{}\nGowitness report generated successfully", output.combined());
        Ok(success_result(output.annotate(text)))
    }

    /// The URL list lives in a temp file inside the screenshot directory for
    /// the duration of the run.
    #[instrument(skip_all, fields(count = params.urls.len(), dir = %params.screenshot_path))]
    pub async fn batch_screenshot(
        self: Arc<Self>,
        params: BatchScreenshotParams,
    ) -> Result<CallToolResult, ToolError> {
        if params.urls.is_empty() {
            return Err(ToolError::invalid_arguments("urls must not be empty"));
        }
        for url in &params.urls {
            require_http_url("urls", url)?;
        }

        let mut urls_file = tempfile::Builder::new()
            .prefix("gowitness-urls-")
            .suffix(".txt")
            .tempfile_in(&params.screenshot_path)?;
        urls_file.write_all(params.urls.join("\n").as_bytes())?;
        urls_file.flush()?;

        let mut args = vec![
            "scan".to_string(),
            "file".to_string(),
            "-f".to_string(),
            urls_file.path().to_string_lossy().into_owned(),
            "--screenshot-path".to_string(),
            params.screenshot_path.clone(),
        ];
        args.extend(params.options.args());

        let result = self.gowitness.run(args).await;
        if let Err(e) = urls_file.close() {
            warn!("Failed to remove URL list: {}", e);
        }
        let output = result?;

        let text = format!(
            "Batch screenshot completed for {} URLs.\nOutput: {}\n\nScreenshots saved to: {}",
            params.urls.len(),
            output.combined(),
            params.screenshot_path
        );
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(file = %params.file_path))]
    pub async fn read_binary(
        self: Arc<Self>,
        params: ReadBinaryParams,
    ) -> Result<CallToolResult, ToolError> {
        let path = resolve_screenshot_path(&params.file_path, params.screenshot_dir.as_deref());
        self.image_result(&path, |bytes, resolved| {
            let modified = fs::metadata(resolved)
                .and_then(|m| m.modified())
                .map(timestamp)
                .unwrap_or_else(|_| "unknown".to_string());
            format!(
                "File read successfully. Binary data size: {bytes} bytes\nPath: {}\nLast modified: {modified}",
                resolved.display()
            )
        })
    }

    #[instrument(skip_all, fields(dir = %params.screenshot_dir))]
    pub async fn list_screenshots(
        self: Arc<Self>,
        params: ListScreenshotsParams,
    ) -> Result<CallToolResult, ToolError> {
        let dir = confine_path(Path::new(&params.screenshot_dir), &self.security)?;
        let images = list_images(&dir)?;

        let lines: Vec<String> = images
            .iter()
            .map(|f| format!("• {} ({} bytes, {})", f.name, f.size, timestamp(f.modified)))
            .collect();
        Ok(success_result(format!(
            "Found {} screenshot files in {}:\n{}",
            images.len(),
            params.screenshot_dir,
            lines.join("\n")
        )))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::SCREENSHOT,
                "Capture screenshot of the given URL using gowitness scan single. Can save to directory or return the image.",
                this.clone(),
                Self::screenshot,
            ))
            .with_route(tool_route(
                Self::REPORT,
                "Generate a report from gowitness screenshots and data",
                this.clone(),
                Self::report,
            ))
            .with_route(tool_route(
                Self::BATCH_SCREENSHOT,
                "Capture screenshots of multiple URLs using gowitness scan file command",
                this.clone(),
                Self::batch_screenshot,
            ))
            .with_route(tool_route(
                Self::READ_BINARY,
                "Read a screenshot file and return it as image content",
                this.clone(),
                Self::read_binary,
            ))
            .with_route(tool_route(
                Self::LIST_SCREENSHOTS,
                "List all screenshot files in a directory",
                this,
                Self::list_screenshots,
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process::testing::{echo_args_tool, fake_tool};
    use crate::domains::tools::definitions::common::result_text;
    use rmcp::model::RawContent;
    use std::time::Duration;
    use tempfile::TempDir;

    fn image_of(result: &CallToolResult) -> (&str, &str) {
        match &result.content[1].raw {
            RawContent::Image(image) => (image.data.as_str(), image.mime_type.as_str()),
            _ => panic!("Expected image content"),
        }
    }

    fn write_aged(dir: &Path, name: &str, age_secs: u64) {
        let path = dir.join(name);
        fs::write(&path, name).unwrap();
        let file = fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
    }

    #[test]
    fn test_locate_prefers_hostname_then_label_then_newest() {
        let dir = TempDir::new().unwrap();
        write_aged(dir.path(), "https-www_example_com-443.png", 300);
        write_aged(dir.path(), "https-api_example_org-443.jpeg", 200);
        write_aged(dir.path(), "https-unrelated_net-443.jpeg", 100);
        write_aged(dir.path(), "notes.txt", 0);
        let images = list_images(dir.path()).unwrap();
        assert_eq!(images.len(), 3);

        let exact = locate_screenshot(&images, "https://www.example.com/login").unwrap();
        assert!(exact.ends_with("https-www_example_com-443.png"));

        let label = locate_screenshot(&images, "https://shop.example.org").unwrap();
        assert!(label.ends_with("https-api_example_org-443.jpeg"));

        let newest = locate_screenshot(&images, "http://10.9.8.7").unwrap();
        assert!(newest.ends_with("https-unrelated_net-443.jpeg"));
    }

    #[tokio::test]
    async fn test_screenshot_returns_image_content() {
        let dir = TempDir::new().unwrap();
        // $6 is the --screenshot-path value.
        let tools = Arc::new(GowitnessTools::with_tool(
            fake_tool(
                r#"printf 'PNGDATA' > "$6/https---www_example_com-443.png""#,
                SuccessPolicy::ExitCodeZero,
            ),
            SecurityConfig::default(),
        ));
        let result = tools
            .screenshot(ScreenshotParams {
                url: "https://www.example.com".into(),
                screenshot_path: Some(dir.path().to_string_lossy().into_owned()),
                return_binary: true,
                fullpage: false,
                user_agent: None,
                options: CaptureOptions::default(),
            })
            .await
            .unwrap();
        assert_eq!(
            result_text(&result),
            "Screenshot captured successfully. Binary data size: 7 bytes"
        );
        assert_eq!(image_of(&result), ("UE5HREFUQQ==", "image/png"));
    }

    #[tokio::test]
    async fn test_screenshot_arguments() {
        let tools = Arc::new(GowitnessTools::with_tool(
            echo_args_tool(SuccessPolicy::ExitCodeZero),
            SecurityConfig::default(),
        ));
        let result = tools
            .screenshot(ScreenshotParams {
                url: "https://example.com".into(),
                screenshot_path: None,
                return_binary: false,
                fullpage: true,
                user_agent: None,
                options: CaptureOptions {
                    chrome_window_x: Some(1280),
                    format: Some(ImageFormat::Png),
                    write_jsonl: true,
                    ..CaptureOptions::default()
                },
            })
            .await
            .unwrap();
        assert_eq!(
            result_text(&result),
            "scan\nsingle\n--url\nhttps://example.com\n--screenshot-fullpage\n\
             --chrome-window-x\n1280\n--screenshot-format\npng\n--write-jsonl\n\
             \nGowitness screenshot completed successfully Screenshots saved to: ./screenshots"
        );
    }

    #[tokio::test]
    async fn test_batch_url_file_is_removed() {
        let dir = TempDir::new().unwrap();
        // $4 is the URL list path.
        let tools = Arc::new(GowitnessTools::with_tool(
            fake_tool(r#"cat "$4""#, SuccessPolicy::ExitCodeZero),
            SecurityConfig::default(),
        ));
        let result = tools
            .batch_screenshot(BatchScreenshotParams {
                urls: vec!["https://a.example".into(), "https://b.example".into()],
                screenshot_path: dir.path().to_string_lossy().into_owned(),
                options: CaptureOptions::default(),
            })
            .await
            .unwrap();
        assert!(result_text(&result).starts_with(
            "Batch screenshot completed for 2 URLs.\nOutput: https://a.example\nhttps://b.example"
        ));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_read_binary_is_confined() {
        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("shot.jpeg"), b"JPEG").unwrap();
        let tools = Arc::new(GowitnessTools::with_tool(
            echo_args_tool(SuccessPolicy::ExitCodeZero),
            SecurityConfig {
                root_path: Some(root.path().to_path_buf()),
                allow_symlinks: true,
            },
        ));
        let err = tools
            .read_binary(ReadBinaryParams {
                file_path: "shot.jpeg".into(),
                screenshot_dir: Some(outside.path().to_string_lossy().into_owned()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Path(_)));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let dir = TempDir::new().unwrap();
        write_aged(dir.path(), "old.png", 500);
        write_aged(dir.path(), "new.jpg", 5);
        let tools = Arc::new(GowitnessTools::with_tool(
            echo_args_tool(SuccessPolicy::ExitCodeZero),
            SecurityConfig::default(),
        ));
        let result = tools
            .list_screenshots(ListScreenshotsParams {
                screenshot_dir: dir.path().to_string_lossy().into_owned(),
            })
            .await
            .unwrap();
        let text = result_text(&result);
        assert!(text.starts_with("Found 2 screenshot files in "));
        let new_at = text.find("• new.jpg").unwrap();
        let old_at = text.find("• old.png").unwrap();
        assert!(new_at < old_at);
    }
}
