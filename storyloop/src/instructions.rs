//! Agent instructions for each workflow action.
//!
//! Instructions are minijinja templates so projects can point the workflow at
//! their own agent commands. Defaults target the BMad agent personas.

use std::fmt;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};

/// Workflow action behind an agent invocation. The label is what command
/// records and notifications show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Draft,
    Dev,
    Qa,
    Commit,
}

impl CommandKind {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Dev => "dev",
            Self::Qa => "qa",
            Self::Commit => "commit",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Template sources, configurable under `[instructions]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstructionTemplates {
    pub draft: String,
    /// Variables: `task_id`, `task_name`, `story`.
    pub develop: String,
    /// Variables: `story`.
    pub review: String,
    pub commit: String,
}

impl Default for InstructionTemplates {
    fn default() -> Self {
        Self {
            draft: "/BMad:agents:sm *draft".to_string(),
            develop: "/BMad:agents:dev *develop task {{ task_id }} from story {{ story }}. \
                      Start developing immediately without asking questions. \
                      You have access to MCP servers including: context7 \
                      (use to retrieve up-to-date library documentation)"
                .to_string(),
            review: "/BMad:agents:qa *review {{ story }}".to_string(),
            commit: "/commit".to_string(),
        }
    }
}

impl InstructionTemplates {
    /// Compile every template so mistakes surface at startup.
    pub fn validate(&self) -> Result<()> {
        Instructions::new(self).map(|_| ())
    }
}

/// Compiled instruction templates.
pub struct Instructions {
    env: Environment<'static>,
}

impl Instructions {
    pub fn new(templates: &InstructionTemplates) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template_owned("draft", templates.draft.clone())
            .context("draft template")?;
        env.add_template_owned("develop", templates.develop.clone())
            .context("develop template")?;
        env.add_template_owned("review", templates.review.clone())
            .context("review template")?;
        env.add_template_owned("commit", templates.commit.clone())
            .context("commit template")?;
        Ok(Self { env })
    }

    pub fn draft(&self) -> Result<String> {
        self.render("draft", context! {})
    }

    pub fn develop(&self, task_id: &str, task_name: &str, story: &str) -> Result<String> {
        self.render(
            "develop",
            context! {
                task_id => task_id,
                task_name => task_name,
                story => story,
            },
        )
    }

    pub fn review(&self, story: &str) -> Result<String> {
        self.render("review", context! { story => story })
    }

    pub fn commit(&self) -> Result<String> {
        self.render("commit", context! {})
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        let rendered = template
            .render(ctx)
            .with_context(|| format!("render {name} instruction"))?;
        Ok(rendered.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_templates_render_bmad_commands() {
        let instructions = Instructions::new(&InstructionTemplates::default()).expect("compile");
        assert_eq!(instructions.draft().expect("draft"), "/BMad:agents:sm *draft");
        assert_eq!(instructions.commit().expect("commit"), "/commit");
        assert_eq!(
            instructions.review("1.2.story.md").expect("review"),
            "/BMad:agents:qa *review 1.2.story.md"
        );
        let develop = instructions
            .develop("2.1", "Add password field", "1.2.story.md")
            .expect("develop");
        assert!(develop.starts_with("/BMad:agents:dev *develop task 2.1 from story 1.2.story.md."));
        assert!(develop.contains("context7"));
    }

    #[test]
    fn custom_templates_can_use_task_name() {
        let templates = InstructionTemplates {
            develop: "work on {{ task_name }} ({{ task_id }})".to_string(),
            ..InstructionTemplates::default()
        };
        let instructions = Instructions::new(&templates).expect("compile");
        assert_eq!(
            instructions.develop("3", "Ship it", "s.md").expect("develop"),
            "work on Ship it (3)"
        );
    }

    #[test]
    fn labels_match_command_records() {
        let labels: Vec<&str> = [
            CommandKind::Draft,
            CommandKind::Dev,
            CommandKind::Qa,
            CommandKind::Commit,
        ]
        .iter()
        .map(CommandKind::label)
        .collect();
        assert_eq!(labels, vec!["draft", "dev", "qa", "commit"]);
    }
}
