//! Final prompt handed to the agent.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::io::instructions::Instructions;

const AGENT_TEMPLATE: &str = include_str!("prompts/agent.md");

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("agent", AGENT_TEMPLATE)?;
        Ok(Self { env })
    }

    fn render_agent(&self, instructions: &str, workspace_branch: &str) -> Result<String> {
        let template = self.env.get_template("agent")?;
        let rendered = template.render(context! {
            instructions => instructions.trim_end(),
            workspace_branch => (!workspace_branch.is_empty()).then_some(workspace_branch),
        })?;
        Ok(rendered)
    }
}

/// Fill in the branch placeholders and wrap the text with the commit rules.
pub fn render_prompt(
    instructions: &Instructions,
    base_branch: &str,
    workspace_branch: &str,
) -> Result<String> {
    let text = instructions.substitute(base_branch, workspace_branch);
    PromptEngine::new()?.render_agent(&text, workspace_branch)
}
