//! System prompts and user templates for each task kind.
//!
//! Templates use `{name}` placeholders that are filled from the task inputs.
//! The output-format section is not part of the templates: the builder
//! appends it from the schema so prompts and validation never drift apart.

use crate::schema::TaskKind;

/// System prompt and user template for one task kind.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub system: &'static str,
    pub user: &'static str,
}

const BACKGROUND_DISCOVERY_SYSTEM: &str = r#"You are an expert research assistant specializing in background discovery. You analyze a topic and assemble the factual foundation that content creators build on.

Be thorough and structured. Prefer current, verifiable information over speculation, and say so when a point is contested."#;

const BACKGROUND_DISCOVERY_USER: &str = r#"Topic: {topic}

Research the topic above and cover:

1. **Core Concepts & Definitions**: key terms and the principles behind them
2. **Historical Context**: milestones and how the topic evolved
3. **Current State & Trends**: recent developments, open challenges, opportunities
4. **Key Stakeholders & Perspectives**: people, organizations and competing viewpoints
5. **Related Topics**: adjacent subjects and cross-disciplinary links
6. **Sources**: authoritative publications worth citing or reading further"#;

const STRUCTURAL_PLANNING_SYSTEM: &str = r#"You are an expert content strategist. You turn background research into a clear, logical content structure that serves a specific audience and objective.

Your plans are concrete enough that a writer can draft directly from them."#;

const STRUCTURAL_PLANNING_USER: &str = r#"Create a structural plan from the research below.

**Background Research:**
{background_research}

**Content Objectives:**
{content_objectives}

**Target Audience:**
{target_audience}

**Content Type:**
{content_type}

The plan must define the main message and angle, an ordered outline of sections with the points each covers, the opening hook, the closing strategy, the tone, and a realistic length estimate. Suggest engagement techniques where they fit the audience."#;

const DRAFT_GENERATION_SYSTEM: &str = r#"You are an expert content writer and editor. You transform structural plans into engaging, well-organized prose tailored to the intended audience.

Stay faithful to the plan's structure while keeping the writing natural and readable."#;

const DRAFT_GENERATION_USER: &str = r#"Write a complete content draft from the research and plan below.

**Background Research:**
{background_research}

**Structural Plan:**
{structural_plan}

**Additional Instructions:**
{additional_instructions}

Requirements:
- Follow the outline and keep transitions between sections smooth
- Integrate the research naturally and keep claims accurate
- Match tone and style to the target audience
- Open with a compelling introduction and close with a clear conclusion
- Use Markdown headings and short paragraphs in the body; it should need minimal editing before publication"#;

const INTEREST_DISCOVERY_SYSTEM: &str = r#"You are an expert content strategist who finds the questions that make people stop scrolling. Given a field and keywords, you identify concise, thought-provoking questions tied to current debates.

Keep every suggestion within ethical bounds: provocative is fine, misleading or harmful is not."#;

const INTEREST_DISCOVERY_USER: &str = r#"Field of Topic: {field_of_topic}
Keywords: {keywords}

Find the most attention-grabbing questions for this field and these keywords:

1. **Primary Question**: the single most compelling question, under 15 words
2. **Alternatives**: 3-5 further questions, each from a different angle
3. **Controversy Analysis**: why these questions spark debate right now
4. **Audience Appeal**: the emotions they trigger and who engages most
5. **Engagement Potential**: expected reactions and shareability, scored 1-10
6. **Ethical Considerations**: risks and how to handle them responsibly"#;

/// Instructions appended after every user prompt.
pub const OUTPUT_FORMAT_HEADER: &str = "## OUTPUT FORMAT";

pub const OUTPUT_FORMAT_FOOTER: &str =
    "Output ONLY the JSON object. No markdown fences, no additional text or explanation.";

/// Returns the prompt template for a task kind.
pub fn template_for(kind: TaskKind) -> PromptTemplate {
    match kind {
        TaskKind::BackgroundDiscovery => PromptTemplate {
            system: BACKGROUND_DISCOVERY_SYSTEM,
            user: BACKGROUND_DISCOVERY_USER,
        },
        TaskKind::StructuralPlanning => PromptTemplate {
            system: STRUCTURAL_PLANNING_SYSTEM,
            user: STRUCTURAL_PLANNING_USER,
        },
        TaskKind::DraftGeneration => PromptTemplate {
            system: DRAFT_GENERATION_SYSTEM,
            user: DRAFT_GENERATION_USER,
        },
        TaskKind::InterestDiscovery => PromptTemplate {
            system: INTEREST_DISCOVERY_SYSTEM,
            user: INTEREST_DISCOVERY_USER,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;

    #[test]
    fn test_every_kind_has_template() {
        for kind in TaskKind::all() {
            let template = template_for(*kind);
            assert!(!template.system.is_empty());
            assert!(!template.user.is_empty());
        }
    }

    #[test]
    fn test_placeholders_match_declared_inputs() {
        let registry = SchemaRegistry::builtin().unwrap();
        for kind in TaskKind::all() {
            let schema = registry.get(*kind).unwrap();
            let template = template_for(*kind);
            for input in &schema.inputs {
                let placeholder = format!("{{{}}}", input.name);
                assert!(
                    template.user.contains(&placeholder),
                    "{} template lacks {}",
                    kind,
                    placeholder
                );
            }
        }
    }
}
