//! System prompt for the desktop agent.

use crate::tools::{ToolContext, ToolRegistry};

/// Build the system instruction with the registered tool list.
pub fn build_system_prompt(ctx: &ToolContext, tools: &ToolRegistry) -> String {
    let tool_descriptions = tools
        .list_tools()
        .iter()
        .map(|t| format!("- **{}**: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an assistant with full access to the user's computer: files, a web browser, spreadsheets and a shell.

Working directory: {workspace}
User desktop: {desktop}

## Tools

{tool_descriptions}

## Rules

1. **Always use tools** when the task requires them. Never answer that something is unavailable without trying.

2. **Work autonomously** through multi-step tasks. Do not ask the user for data you can find with tools.

3. **Use full paths**. Files for the user go on the desktop unless told otherwise.

4. **Recover from failures** - if a tool returns an error, try an alternative approach.

5. **Web search** - browser_goto("google.com"), then browser_type("q", "query"), then browser_press_key("Enter").

When the task is done, reply with a short summary of what you did and where any output was saved."#,
        workspace = ctx.workspace.display(),
        desktop = ctx.desktop.display(),
        tool_descriptions = tool_descriptions
    )
}
