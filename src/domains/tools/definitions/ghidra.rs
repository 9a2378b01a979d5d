//! Ghidra adapter: headless analysis through `analyzeHeadless`.
//!
//! `ghidra-analyze` imports a binary into a project under the configured
//! project directory. The other operations re-open that program with
//! `-process <file name> -noanalysis` and run a small Jython post-script that
//! prints `address | ...` lines, which are parsed here. Caller values reach
//! the scripts as script arguments, never by editing the script text.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::common::{pretty_json, success_result, truncate_chars};
use crate::core::config::SecurityConfig;
use crate::core::process::{CommandRunner, ExternalTool, SuccessPolicy};
use crate::core::security::confine_path;
use crate::domains::tools::ToolError;
use crate::domains::tools::route::tool_route;

const ANALYSIS_EXCERPT_CHARS: usize = 2000;
const MAX_STRINGS: usize = 100;

// ============================================================================
// Post-scripts
// ============================================================================

/// A Jython post-script written into the project directory before use.
struct PostScript {
    file_name: &'static str,
    source: &'static str,
}

const DECOMPILE_SCRIPT: PostScript = PostScript {
    file_name: "decompile_script.py",
    source: r#"from ghidra.app.decompiler import DecompInterface
from ghidra.util.task import ConsoleTaskMonitor

args = getScriptArgs()
target = args[0] if len(args) > 0 else "main"

decomp = DecompInterface()
decomp.openProgram(currentProgram)

for func in currentProgram.getFunctionManager().getFunctions(True):
    if target == "all" or target.lower() in func.getName().lower():
        results = decomp.decompileFunction(func, 60, ConsoleTaskMonitor())
        if results.decompileCompleted():
            print("=== " + func.getName() + " ===")
            print(results.getDecompiledFunction().getC())
            print("")
"#,
};

const FUNCTIONS_SCRIPT: PostScript = PostScript {
    file_name: "list_functions.py",
    source: r#"args = getScriptArgs()
pattern = args[0].lower() if len(args) > 0 else ""

print("FUNCTIONS:")
for func in currentProgram.getFunctionManager().getFunctions(True):
    name = func.getName()
    if not pattern or pattern in name.lower():
        print("%s | %s | %s" % (func.getEntryPoint(), name, func.getSignature()))
"#,
};

const STRINGS_SCRIPT: PostScript = PostScript {
    file_name: "extract_strings.py",
    source: r#"args = getScriptArgs()
min_len = int(args[0]) if len(args) > 0 else 4

print("STRINGS:")
for data in currentProgram.getListing().getDefinedData(True):
    if data.hasStringValue():
        value = data.getValue()
        if value and len(str(value)) >= min_len:
            print("%s | %s" % (data.getAddress(), str(value)[:200]))
"#,
};

const IMPORTS_SCRIPT: PostScript = PostScript {
    file_name: "list_imports.py",
    source: r#"symbol_table = currentProgram.getSymbolTable()
external_manager = currentProgram.getExternalManager()

print("IMPORTS:")
for lib in external_manager.getExternalLibraryNames():
    print("Library: %s" % lib)
    for sym in symbol_table.getExternalSymbols():
        if sym.getParentNamespace().getName() == lib:
            print("  - %s" % sym.getName())
"#,
};

// ============================================================================
// Tool Parameters
// ============================================================================

fn default_project() -> String {
    "analysis".to_string()
}

/// Parameters for `ghidra-analyze`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AnalyzeParams {
    /// Path to binary file to analyze
    #[serde(rename = "binaryPath")]
    pub binary_path: String,

    /// Name for the Ghidra project
    #[serde(rename = "projectName", default = "default_project")]
    pub project_name: String,
}

/// Parameters for `ghidra-decompile`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DecompileParams {
    /// Path to binary file
    #[serde(rename = "binaryPath")]
    pub binary_path: String,

    /// Specific function to decompile (default: main or entry point; "all" for every function)
    #[serde(rename = "functionName")]
    pub function_name: Option<String>,

    /// Ghidra project name
    #[serde(rename = "projectName", default = "default_project")]
    pub project_name: String,
}

/// Parameters for `ghidra-functions`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FunctionsParams {
    /// Path to binary file
    #[serde(rename = "binaryPath")]
    pub binary_path: String,

    /// Ghidra project name
    #[serde(rename = "projectName", default = "default_project")]
    pub project_name: String,

    /// Filter functions by name pattern
    pub filter: Option<String>,
}

fn default_min_length() -> u32 {
    4
}

/// Parameters for `ghidra-strings`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct StringsParams {
    /// Path to binary file
    #[serde(rename = "binaryPath")]
    pub binary_path: String,

    /// Ghidra project name
    #[serde(rename = "projectName", default = "default_project")]
    pub project_name: String,

    /// Minimum string length
    #[serde(rename = "minLength", default = "default_min_length")]
    pub min_length: u32,
}

/// Parameters for `ghidra-imports`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ImportsParams {
    /// Path to binary file
    #[serde(rename = "binaryPath")]
    pub binary_path: String,

    /// Ghidra project name
    #[serde(rename = "projectName", default = "default_project")]
    pub project_name: String,
}

/// `a | b | c` lines printed by the post-scripts, split into at most `n`
/// trimmed fields.
fn pipe_rows(output: &str, n: usize) -> impl Iterator<Item = Vec<&str>> {
    output
        .lines()
        .filter(|line| line.contains(" | "))
        .map(move |line| line.splitn(n, " | ").map(str::trim).collect())
}

fn function_rows(output: &str) -> Vec<Value> {
    pipe_rows(output, 3)
        .map(|fields| {
            json!({
                "address": fields.first(),
                "name": fields.get(1),
                "signature": fields.get(2),
            })
        })
        .collect()
}

fn string_rows(output: &str) -> Vec<Value> {
    pipe_rows(output, 2)
        .map(|fields| json!({"address": fields.first(), "value": fields.get(1)}))
        .collect()
}

/// Everything from the first `=== name ===` header on, if any function was
/// decompiled.
fn decompiled_sections(output: &str) -> Option<String> {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.iter().position(|line| {
        let line = line.trim();
        line.len() > 8 && line.starts_with("=== ") && line.ends_with(" ===")
    })?;
    Some(lines[start..].join("\n").trim_end().to_string())
}

/// Program name inside the project: the binary's file name.
fn program_name(binary_path: &str) -> Result<String, ToolError> {
    Path::new(binary_path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            ToolError::invalid_arguments(format!("binaryPath has no file name: {binary_path}"))
        })
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct GhidraTools {
    headless: ExternalTool,
    project_dir: PathBuf,
    security: SecurityConfig,
}

impl GhidraTools {
    pub const ANALYZE: &'static str = "ghidra-analyze";
    pub const DECOMPILE: &'static str = "ghidra-decompile";
    pub const FUNCTIONS: &'static str = "ghidra-functions";
    pub const STRINGS: &'static str = "ghidra-strings";
    pub const IMPORTS: &'static str = "ghidra-imports";

    pub fn new(
        binary: PathBuf,
        project_dir: PathBuf,
        runner: Arc<CommandRunner>,
        security: SecurityConfig,
    ) -> Self {
        Self::with_tool(
            ExternalTool::new(binary, SuccessPolicy::AnyOutputOrExitZero, runner),
            project_dir,
            security,
        )
    }

    pub fn with_tool(
        headless: ExternalTool,
        project_dir: PathBuf,
        security: SecurityConfig,
    ) -> Self {
        Self {
            headless,
            project_dir,
            security,
        }
    }

    /// Run `script` against an already imported program; stdout then stderr.
    async fn run_post_script(
        &self,
        binary_path: &str,
        project_name: &str,
        script: &PostScript,
        script_args: Vec<String>,
    ) -> Result<String, ToolError> {
        let program = program_name(binary_path)?;
        tokio::fs::create_dir_all(&self.project_dir).await?;
        tokio::fs::write(self.project_dir.join(script.file_name), script.source).await?;
        debug!(script = script.file_name, program = %program, "Running post-script");

        let project_dir = self.project_dir.to_string_lossy().into_owned();
        let mut args = vec![
            project_dir.clone(),
            project_name.to_string(),
            "-process".to_string(),
            program,
            "-noanalysis".to_string(),
            "-scriptPath".to_string(),
            project_dir,
            "-postScript".to_string(),
            script.file_name.to_string(),
        ];
        args.extend(script_args);

        let output = self.headless.run(args).await?;
        Ok(output.annotate(output.combined()))
    }

    #[instrument(skip_all, fields(binary = %params.binary_path, project = %params.project_name))]
    pub async fn analyze(
        self: Arc<Self>,
        params: AnalyzeParams,
    ) -> Result<CallToolResult, ToolError> {
        let binary = confine_path(Path::new(&params.binary_path), &self.security)?;
        tokio::fs::create_dir_all(&self.project_dir).await?;

        let args = [
            self.project_dir.to_string_lossy().into_owned(),
            params.project_name.clone(),
            "-import".to_string(),
            binary.to_string_lossy().into_owned(),
            "-overwrite".to_string(),
            "-analysisTimeoutPerFile".to_string(),
            "300".to_string(),
        ];
        let output = self.headless.run(args).await?;
        let text = format!(
            "Analysis complete for: {}\n\nProject: {}/{}\n\n{}",
            params.binary_path,
            self.project_dir.display(),
            params.project_name,
            truncate_chars(&output.combined(), ANALYSIS_EXCERPT_CHARS)
        );
        Ok(success_result(output.annotate(text)))
    }

    #[instrument(skip_all, fields(binary = %params.binary_path, function = ?params.function_name))]
    pub async fn decompile(
        self: Arc<Self>,
        params: DecompileParams,
    ) -> Result<CallToolResult, ToolError> {
        let target = params.function_name.unwrap_or_else(|| "main".to_string());
        let output = self
            .run_post_script(
                &params.binary_path,
                &params.project_name,
                &DECOMPILE_SCRIPT,
                vec![target],
            )
            .await?;
        Ok(success_result(decompiled_sections(&output).unwrap_or(output)))
    }

    #[instrument(skip_all, fields(binary = %params.binary_path))]
    pub async fn functions(
        self: Arc<Self>,
        params: FunctionsParams,
    ) -> Result<CallToolResult, ToolError> {
        let output = self
            .run_post_script(
                &params.binary_path,
                &params.project_name,
                &FUNCTIONS_SCRIPT,
                params.filter.into_iter().collect(),
            )
            .await?;
        let functions = function_rows(&output);
        Ok(success_result(format!(
            "Found {} functions:\n\n{}",
            functions.len(),
            pretty_json(&Value::Array(functions))
        )))
    }

    #[instrument(skip_all, fields(binary = %params.binary_path, min_length = params.min_length))]
    pub async fn strings(
        self: Arc<Self>,
        params: StringsParams,
    ) -> Result<CallToolResult, ToolError> {
        let output = self
            .run_post_script(
                &params.binary_path,
                &params.project_name,
                &STRINGS_SCRIPT,
                vec![params.min_length.to_string()],
            )
            .await?;
        let mut strings = string_rows(&output);
        let total = strings.len();
        strings.truncate(MAX_STRINGS);
        Ok(success_result(format!(
            "Extracted {} strings:\n\n{}",
            total,
            pretty_json(&Value::Array(strings))
        )))
    }

    #[instrument(skip_all, fields(binary = %params.binary_path))]
    pub async fn imports(
        self: Arc<Self>,
        params: ImportsParams,
    ) -> Result<CallToolResult, ToolError> {
        let output = self
            .run_post_script(
                &params.binary_path,
                &params.project_name,
                &IMPORTS_SCRIPT,
                Vec::new(),
            )
            .await?;
        Ok(success_result(output))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::ANALYZE,
                "Analyze a binary file with Ghidra and perform auto-analysis",
                this.clone(),
                Self::analyze,
            ))
            .with_route(tool_route(
                Self::DECOMPILE,
                "Decompile functions from an analyzed binary",
                this.clone(),
                Self::decompile,
            ))
            .with_route(tool_route(
                Self::FUNCTIONS,
                "List all functions in an analyzed binary",
                this.clone(),
                Self::functions,
            ))
            .with_route(tool_route(
                Self::STRINGS,
                "Extract strings from a binary",
                this.clone(),
                Self::strings,
            ))
            .with_route(tool_route(
                Self::IMPORTS,
                "List imported functions/libraries",
                this,
                Self::imports,
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process::testing::{echo_args_tool, fake_tool};
    use crate::domains::tools::definitions::common::result_text;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn tools(tool: ExternalTool, project_dir: &Path) -> Arc<GhidraTools> {
        Arc::new(GhidraTools::with_tool(
            tool,
            project_dir.to_path_buf(),
            SecurityConfig::default(),
        ))
    }

    #[test]
    fn test_function_rows() {
        let output = "INFO  Opening project\nFUNCTIONS:\n\
                      00101139 | main | int main(void)\n\
                      00101020 | _start | void _start(void)\n";
        assert_eq!(
            function_rows(output),
            vec![
                json!({"address": "00101139", "name": "main", "signature": "int main(void)"}),
                json!({"address": "00101020", "name": "_start", "signature": "void _start(void)"}),
            ]
        );
    }

    #[test]
    fn test_string_value_keeps_inner_separator() {
        let rows = string_rows("00102004 | usage: a | b\n");
        assert_eq!(rows[0]["value"], "usage: a | b");
    }

    #[test]
    fn test_decompiled_sections_skip_log_preamble() {
        let output = concat!(
            "INFO  REPORT: Processing input files\n",
            "=== main ===\nint main(void) {\n  return 0;\n}\n\n",
        );
        assert_eq!(
            decompiled_sections(output).unwrap(),
            "=== main ===\nint main(void) {\n  return 0;\n}"
        );
        assert_eq!(decompiled_sections("ERROR no program"), None);
    }

    #[tokio::test]
    async fn test_analyze_missing_binary_never_runs_ghidra() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let script = format!("touch '{}'", marker.display());
        let tools = tools(fake_tool(&script, SuccessPolicy::always()), dir.path());
        let err = tools
            .analyze(AnalyzeParams {
                binary_path: dir.path().join("missing.elf").display().to_string(),
                project_name: default_project(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Path(_)));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_analyze_imports_resolved_binary() {
        let dir = TempDir::new().unwrap();
        let binary = dir.path().join("firmware.bin");
        std::fs::write(&binary, b"\x7fELF").unwrap();
        let projects = dir.path().join("projects");
        let tools = tools(echo_args_tool(SuccessPolicy::always()), &projects);

        let result = tools
            .analyze(AnalyzeParams {
                binary_path: binary.display().to_string(),
                project_name: "fw".into(),
            })
            .await
            .unwrap();
        let text = result_text(&result);
        assert!(text.starts_with(&format!(
            "Analysis complete for: {}\n\nProject: {}/fw\n\n",
            binary.display(),
            projects.display()
        )));
        assert!(text.contains("\n-import\n"));
        assert!(text.contains("\n-analysisTimeoutPerFile\n300\n"));
        assert!(projects.is_dir());
    }

    #[tokio::test]
    async fn test_functions_filter_is_a_script_argument() {
        let dir = TempDir::new().unwrap();
        let tools = tools(
            fake_tool(
                r#"[ "${10}" = "crypt" ] && echo "00401000 | do_crypt | void do_crypt(char *)""#,
                SuccessPolicy::AnyOutputOrExitZero,
            ),
            dir.path(),
        );
        let result = tools
            .functions(FunctionsParams {
                binary_path: "/samples/malware.exe".into(),
                project_name: default_project(),
                filter: Some("crypt".into()),
            })
            .await
            .unwrap();
        let text = result_text(&result);
        assert!(text.starts_with("Found 1 functions:\n\n"));
        assert!(text.contains("\"name\": \"do_crypt\""));
        let script = std::fs::read_to_string(dir.path().join("list_functions.py")).unwrap();
        assert!(script.contains("getScriptArgs()"));
    }

    #[tokio::test]
    async fn test_post_script_argv() {
        let dir = TempDir::new().unwrap();
        let tools = tools(echo_args_tool(SuccessPolicy::always()), dir.path());
        let result = tools
            .imports(ImportsParams {
                binary_path: "/samples/app".into(),
                project_name: "p".into(),
            })
            .await
            .unwrap();
        let project = dir.path().display().to_string();
        assert_eq!(
            result_text(&result),
            format!(
                "{project}\np\n-process\napp\n-noanalysis\n-scriptPath\n{project}\n-postScript\nlist_imports.py\n"
            )
        );
    }

    #[tokio::test]
    async fn test_strings_are_capped() {
        let dir = TempDir::new().unwrap();
        let tools = tools(
            fake_tool(
                r#"i=0; while [ $i -lt 150 ]; do echo "0040$i | string-$i"; i=$((i+1)); done"#,
                SuccessPolicy::AnyOutputOrExitZero,
            ),
            dir.path(),
        );
        let result = tools
            .strings(StringsParams {
                binary_path: "/samples/app".into(),
                project_name: default_project(),
                min_length: 4,
            })
            .await
            .unwrap();
        let text = result_text(&result);
        assert!(text.starts_with("Extracted 150 strings:\n\n"));
        let (_, json) = text.split_once("\n\n").unwrap();
        let rows: Value = serde_json::from_str(json).unwrap();
        assert_eq!(rows.as_array().unwrap().len(), MAX_STRINGS);
    }
}
