//! System prompt rendering.
//!
//! Sections, in order:
//!
//! 1. **Instructions**: plan checklist format, the execute/solution
//!    protocol and lane markers. Always present.
//! 2. **Custom resources**: runtime-registered tools, data and software,
//!    highlighted so the model prefers them.
//! 3. **Tools** by namespace, then **data items** and **software**.
//! 4. **Self-critique addendum** when critique rounds are enabled.
//!
//! Rendering is deterministic: the same catalog always produces the same
//! prompt.

use assay_core::catalog::{ParameterSpec, ResourceCatalog, ResourceEntry, ToolSpec};

const INSTRUCTIONS: &str = "\
You are a helpful research assistant that solves problems by writing and running code.

Given a task, make a plan first. Write the plan as a numbered checklist and keep it updated as you go:
1. [ ] First step
2. [ ] Second step
3. [ ] Third step

After each step, print the checklist again with the step marked:
1. [✓] First step (completed)
2. [✗] Second step (failed because ...)
3. [ ] Third step

Each response must include your thinking process followed by exactly one of:
- <execute>code</execute> to run code. You will receive the result in an <observation></observation> block.
- <solution>answer</solution> to give the final answer.

Never include both tags in one response. You may also wrap private reasoning in <think></think>.

Code inside <execute> runs as Python by default. Start the block with a marker to pick another interpreter:
- #!R for R code
- #!BASH for a Bash script
- #!CLI for a single command line

Output longer than the configured limit is truncated, so print summaries rather than whole tables.";

const SELF_CRITIC_ADDENDUM: &str = "\
After you give a solution, you may receive feedback on it. Treat the feedback as a reviewer's \
comments: address every point, run more code if needed, and then give an improved solution.";

/// Builder for the system prompt sent ahead of every model call.
#[derive(Debug, Clone, Copy)]
pub struct SystemPrompt<'a> {
    catalog: &'a ResourceCatalog,
    self_critic: bool,
}

impl<'a> SystemPrompt<'a> {
    pub fn new(catalog: &'a ResourceCatalog) -> Self {
        Self {
            catalog,
            self_critic: false,
        }
    }

    pub fn with_self_critic(mut self, enabled: bool) -> Self {
        self.self_critic = enabled;
        self
    }

    pub fn render(&self) -> String {
        let mut sections = vec![INSTRUCTIONS.to_string()];

        if let Some(custom) = self.render_custom() {
            sections.push(custom);
        }
        if let Some(tools) = self.render_tools() {
            sections.push(tools);
        }
        if let Some(data) = render_entries("Data items", self.catalog.data.iter().filter(|e| !e.custom)) {
            sections.push(data);
        }
        if let Some(software) =
            render_entries("Software", self.catalog.software.iter().filter(|e| !e.custom))
        {
            sections.push(software);
        }
        if self.self_critic {
            sections.push(SELF_CRITIC_ADDENDUM.to_string());
        }

        sections.join("\n\n")
    }

    fn render_custom(&self) -> Option<String> {
        let tools: Vec<&ToolSpec> = self.catalog.custom_tools().collect();
        let data: Vec<&ResourceEntry> = self.catalog.data.iter().filter(|e| e.custom).collect();
        let software: Vec<&ResourceEntry> =
            self.catalog.software.iter().filter(|e| e.custom).collect();
        if tools.is_empty() && data.is_empty() && software.is_empty() {
            return None;
        }

        let mut out = String::from(
            "PRIORITY CUSTOM RESOURCES\nThese were added for this deployment. Prefer them over the defaults below.",
        );
        for tool in tools {
            out.push('\n');
            out.push_str(&render_tool(tool));
        }
        for entry in data.into_iter().chain(software) {
            out.push('\n');
            out.push_str(&render_entry(entry));
        }
        Some(out)
    }

    fn render_tools(&self) -> Option<String> {
        let namespaces: Vec<String> = self
            .catalog
            .tools
            .iter()
            .filter_map(|(namespace, tools)| {
                let lines: Vec<String> = tools.iter().filter(|t| !t.custom).map(render_tool).collect();
                if lines.is_empty() {
                    None
                } else {
                    Some(format!("Import file: {namespace}\n{}", lines.join("\n")))
                }
            })
            .collect();

        if namespaces.is_empty() {
            None
        } else {
            Some(format!("Function dictionary:\n{}", namespaces.join("\n\n")))
        }
    }
}

fn render_tool(tool: &ToolSpec) -> String {
    let mut line = format!("- {}: {}", tool.name, tool.description);
    if !tool.required_parameters.is_empty() {
        line.push_str(&format!(
            "\n  required: {}",
            render_parameters(&tool.required_parameters)
        ));
    }
    if !tool.optional_parameters.is_empty() {
        line.push_str(&format!(
            "\n  optional: {}",
            render_parameters(&tool.optional_parameters)
        ));
    }
    line
}

fn render_parameters(params: &[ParameterSpec]) -> String {
    params
        .iter()
        .map(|p| match &p.default {
            Some(default) => format!("{} ({}, default {default})", p.name, p.kind),
            None => format!("{} ({})", p.name, p.kind),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_entry(entry: &ResourceEntry) -> String {
    if entry.description.is_empty() {
        format!("- {}", entry.name)
    } else {
        format!("- {}: {}", entry.name, entry.description)
    }
}

fn render_entries<'e>(header: &str, entries: impl Iterator<Item = &'e ResourceEntry>) -> Option<String> {
    let lines: Vec<String> = entries.map(render_entry).collect();
    if lines.is_empty() {
        None
    } else {
        Some(format!("{header}:\n{}", lines.join("\n")))
    }
}
