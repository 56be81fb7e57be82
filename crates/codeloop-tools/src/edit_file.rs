//! Line-oriented file editing tool.
//!
//! One call changes one line: add a line before `line_number` (or append
//! after the last one), replace it, or delete it. The edited text is syntax-checked before it is written;
//! a failing check aborts the edit and leaves the file untouched.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::args::{self, lenient_usize};
use crate::path_guard::{relative_display, resolve_path};
use crate::syntax;
use crate::{Tool, ToolContext, ToolResult};

pub struct EditFileTool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeType {
    Add,
    Replace,
    Delete,
}

#[derive(Debug, Deserialize)]
struct EditFileArgs {
    path: String,
    #[serde(deserialize_with = "lenient_usize")]
    line_number: usize,
    type_change: String,
    #[serde(default)]
    line_change: String,
}

/// Apply one line change to `content`, keeping its line ending style.
fn apply_change(
    content: &str,
    line_number: usize,
    change: ChangeType,
    line_change: &str,
) -> Result<String, String> {
    let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let trailing_newline = content.ends_with('\n');
    let mut lines: Vec<&str> = content.lines().collect();

    // `add` may also target one past the last line, which appends. That is
    // the only valid edit on an empty file.
    let last = match change {
        ChangeType::Add => lines.len() + 1,
        ChangeType::Replace | ChangeType::Delete => lines.len(),
    };
    if line_number < 1 || line_number > last {
        return Err(format!("line number {line_number} is out of range (1-{last})"));
    }
    let index = line_number - 1;
    let replacement = line_change.trim_end_matches(['\r', '\n']);

    match change {
        ChangeType::Add => lines.insert(index, replacement),
        ChangeType::Replace => lines[index] = replacement,
        ChangeType::Delete => {
            lines.remove(index);
        }
    }

    let mut out = lines.join(newline);
    if (trailing_newline || content.is_empty()) && !lines.is_empty() {
        out.push_str(newline);
    }
    Ok(out)
}

/// Write via a sibling temp file and rename.
async fn write_atomic(path: &std::path::Path, content: &str) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{file_name}.codeloop-tmp"));
    tokio::fs::write(&tmp_path, content.as_bytes()).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit one line of a file. type_change 'add' inserts line_change before line_number (one past the last line appends), 'replace' overwrites that line, 'delete' removes it. Source files are syntax-checked and the edit is rejected if it breaks them."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file (relative to workspace or absolute)"
                },
                "line_number": {
                    "type": "integer",
                    "description": "1-based line number the change applies to"
                },
                "type_change": {
                    "type": "string",
                    "enum": ["add", "replace", "delete"],
                    "description": "Kind of change"
                },
                "line_change": {
                    "type": "string",
                    "description": "New line text for add/replace"
                }
            },
            "required": ["path", "line_number", "type_change"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<ToolResult> {
        let args: EditFileArgs = args::decode(self.name(), params)?;

        let change = match args.type_change.trim().to_ascii_lowercase().as_str() {
            "add" => ChangeType::Add,
            "replace" => ChangeType::Replace,
            "delete" => ChangeType::Delete,
            other => {
                return Ok(ToolResult::failed(format!("unsupported change type: {other}")));
            }
        };

        let path = match resolve_path(&args.path, &context.workspace, context.restrict_to_workspace) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::failed(format!("Path error: {e}"))),
        };

        if !path.is_file() {
            return Ok(ToolResult::failed(format!("File not found: {}", args.path)));
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return Ok(ToolResult::failed(format!("Read error: {e}"))),
        };

        let edited = match apply_change(&content, args.line_number, change, &args.line_change) {
            Ok(e) => e,
            Err(e) => return Ok(ToolResult::failed(e)),
        };

        if let Err(e) = syntax::check(&path, &edited) {
            return Ok(ToolResult::failed(format!("syntax error after modification: {e}")));
        }

        if let Err(e) = write_atomic(&path, &edited).await {
            return Ok(ToolResult::failed(format!("Write error: {e}")));
        }

        let workspace = context
            .workspace
            .canonicalize()
            .unwrap_or_else(|_| context.workspace.clone());

        Ok(ToolResult::success(json!({
            "path": relative_display(&path, &workspace),
            "line_number": args.line_number,
            "type_change": args.type_change.trim().to_ascii_lowercase(),
            "total_lines": edited.lines().count(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEN_LINES: &str = "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"a\")\n\tfmt.Println(\"b\")\n\tfmt.Println(\"c\")\n\tfmt.Println(\"d\")\n}\n";

    fn setup(name: &str, content: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(name), content).unwrap();
        dir
    }

    #[test]
    fn test_apply_change_variants() {
        let src = "a\nb\nc\n";
        assert_eq!(apply_change(src, 2, ChangeType::Add, "x").unwrap(), "a\nx\nb\nc\n");
        assert_eq!(apply_change(src, 2, ChangeType::Replace, "x\n").unwrap(), "a\nx\nc\n");
        assert_eq!(apply_change(src, 3, ChangeType::Delete, "").unwrap(), "a\nb\n");
        assert_eq!(apply_change("a\r\nb", 1, ChangeType::Replace, "z").unwrap(), "z\r\nb");
    }

    #[test]
    fn test_apply_change_out_of_range() {
        let err = apply_change("a\nb\n", 0, ChangeType::Replace, "x").unwrap_err();
        assert_eq!(err, "line number 0 is out of range (1-2)");
        let err = apply_change("a\nb\n", 4, ChangeType::Add, "x").unwrap_err();
        assert_eq!(err, "line number 4 is out of range (1-3)");
        assert!(apply_change("a\nb\n", 3, ChangeType::Replace, "x").is_err());
        assert!(apply_change("", 1, ChangeType::Delete, "").is_err());
    }

    #[test]
    fn test_add_appends_after_last_line() {
        assert_eq!(apply_change("a\nb\n", 3, ChangeType::Add, "c").unwrap(), "a\nb\nc\n");
        assert_eq!(apply_change("a\nb", 3, ChangeType::Add, "c").unwrap(), "a\nb\nc");
        assert_eq!(apply_change("", 1, ChangeType::Add, "package main").unwrap(), "package main\n");
    }

    #[tokio::test]
    async fn test_replace_line_in_go_file() {
        let dir = setup("main.go", TEN_LINES);
        let result = EditFileTool
            .execute(
                json!({"path": "main.go", "line_number": 6, "type_change": "replace", "line_change": "\tfmt.Println(\"z\")"}),
                &ToolContext::new(dir.path()),
            )
            .await
            .unwrap();
        assert!(result.is_success(), "got: {:?}", result.data);
        let written = std::fs::read_to_string(dir.path().join("main.go")).unwrap();
        assert!(written.contains("fmt.Println(\"z\")"));
        assert!(!written.contains("fmt.Println(\"a\")"));
        assert_eq!(written.lines().count(), 10);
    }

    #[tokio::test]
    async fn test_out_of_range_leaves_file_untouched() {
        let dir = setup("x.go", TEN_LINES);
        let result = EditFileTool
            .execute(
                json!({"path": "x.go", "line_number": 999, "type_change": "replace", "line_change": "foo()"}),
                &ToolContext::new(dir.path()),
            )
            .await
            .unwrap();
        assert!(!result.is_success());
        assert!(result.data["error"].as_str().unwrap().contains("out of range"));
        assert_eq!(std::fs::read_to_string(dir.path().join("x.go")).unwrap(), TEN_LINES);
    }

    #[tokio::test]
    async fn test_syntax_error_aborts_write() {
        let dir = setup("main.go", TEN_LINES);
        let result = EditFileTool
            .execute(
                json!({"path": "main.go", "line_number": 10, "type_change": "delete"}),
                &ToolContext::new(dir.path()),
            )
            .await
            .unwrap();
        assert!(!result.is_success());
        let error = result.data["error"].as_str().unwrap();
        assert!(error.starts_with("syntax error after modification"), "got: {error}");
        assert_eq!(std::fs::read_to_string(dir.path().join("main.go")).unwrap(), TEN_LINES);
    }

    #[tokio::test]
    async fn test_plain_text_is_not_checked() {
        let dir = setup("notes.txt", "one\ntwo\n");
        let result = EditFileTool
            .execute(
                json!({"path": "notes.txt", "line_number": "1", "type_change": "ADD", "line_change": "{"}),
                &ToolContext::new(dir.path()),
            )
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(std::fs::read_to_string(dir.path().join("notes.txt")).unwrap(), "{\none\ntwo\n");
    }

    #[tokio::test]
    async fn test_created_empty_file_can_be_filled() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());
        let created = crate::create_file::CreateFileTool
            .execute(json!({"path": "main.go"}), &ctx)
            .await
            .unwrap();
        assert!(created.is_success(), "got: {:?}", created.data);

        for (line, text) in [(1, "package main"), (2, ""), (3, "func main() {}")] {
            let result = EditFileTool
                .execute(
                    json!({"path": "main.go", "line_number": line, "type_change": "add", "line_change": text}),
                    &ctx,
                )
                .await
                .unwrap();
            assert!(result.is_success(), "line {line}: {:?}", result.data);
        }
        assert_eq!(
            std::fs::read_to_string(dir.path().join("main.go")).unwrap(),
            "package main\n\nfunc main() {}\n"
        );
    }

    #[tokio::test]
    async fn test_unsupported_change_type() {
        let dir = setup("notes.txt", "one\n");
        let result = EditFileTool
            .execute(
                json!({"path": "notes.txt", "line_number": 1, "type_change": "move"}),
                &ToolContext::new(dir.path()),
            )
            .await
            .unwrap();
        assert_eq!(result.data["error"], "unsupported change type: move");
    }

    #[tokio::test]
    async fn test_missing_line_number_is_validation_error() {
        let dir = setup("notes.txt", "one\n");
        let err = EditFileTool
            .execute(
                json!({"path": "notes.txt", "type_change": "delete"}),
                &ToolContext::new(dir.path()),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("line_number"));
    }

    #[tokio::test]
    async fn test_json_edit_validated() {
        let dir = setup("config.json", "{\n  \"a\": 1\n}\n");
        let result = EditFileTool
            .execute(
                json!({"path": "config.json", "line_number": 2, "type_change": "replace", "line_change": "  \"a\": "}),
                &ToolContext::new(dir.path()),
            )
            .await
            .unwrap();
        assert!(!result.is_success());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("config.json")).unwrap(),
            "{\n  \"a\": 1\n}\n"
        );
    }
}
