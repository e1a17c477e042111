use serde_json::{json, Value};

/// One entry of the static tool catalog offered to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn to_openai(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        list_files_schema(),
        path_only("read_file", "Read a file", "File path"),
        write_file_schema(),
        path_only("create_file", "Create a new file", "File path"),
        path_only("delete_entry", "Delete a file or directory", "Path to delete"),
        apply_patch_schema(),
        run_command_schema(),
        path_only("summarize_file", "Generate a summary of a file", "File path"),
        path_only("get_summary", "Retrieve a stored summary of a file", "File path"),
    ]
}

/// The catalog in OpenAI function-tool form.
pub fn repo_tool_schemas() -> Vec<Value> {
    tool_definitions().iter().map(ToolDefinition::to_openai).collect()
}

pub fn is_known_tool(name: &str) -> bool {
    tool_definitions().iter().any(|d| d.name == name)
}

fn path_only(name: &'static str, description: &'static str, path_description: &str) -> ToolDefinition {
    ToolDefinition {
        name,
        description,
        parameters: json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": path_description }
            },
            "required": ["path"]
        }),
    }
}

fn list_files_schema() -> ToolDefinition {
    ToolDefinition {
        name: "list_files",
        description: "List files in a directory",
        parameters: json!({
            "type": "object",
            "properties": {
                "dir": { "type": "string", "description": "Directory path" }
            },
            "required": ["dir"]
        }),
    }
}

fn write_file_schema() -> ToolDefinition {
    ToolDefinition {
        name: "write_file",
        description: "Write to a file",
        parameters: json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path" },
                "content": { "type": "string", "description": "File content" }
            },
            "required": ["path", "content"]
        }),
    }
}

fn apply_patch_schema() -> ToolDefinition {
    ToolDefinition {
        name: "apply_patch",
        description: "Apply a unified diff to a file",
        parameters: json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path" },
                "diff": { "type": "string", "description": "Unified diff text" }
            },
            "required": ["path", "diff"]
        }),
    }
}

fn run_command_schema() -> ToolDefinition {
    ToolDefinition {
        name: "run_command",
        description: "Run a shell command in the project",
        parameters: json!({
            "type": "object",
            "properties": {
                "cmd": { "type": "string", "description": "Command" },
                "args": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Arguments"
                }
            },
            "required": ["cmd"]
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_are_unique_and_required_fields_declared() {
        let defs = tool_definitions();
        let mut names: Vec<_> = defs.iter().map(|d| d.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 9);

        for def in &defs {
            let required = def.parameters["required"].as_array().unwrap();
            assert!(!required.is_empty(), "{} declares no required args", def.name);
            for key in required {
                assert!(def.parameters["properties"].get(key.as_str().unwrap()).is_some());
            }
        }
    }

    #[test]
    fn test_openai_shape() {
        let schemas = repo_tool_schemas();
        assert_eq!(schemas[0]["type"], "function");
        assert_eq!(schemas[0]["function"]["name"], "list_files");
        assert!(is_known_tool("apply_patch"));
        assert!(!is_known_tool("grep"));
    }
}
