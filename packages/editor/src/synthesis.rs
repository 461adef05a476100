//! # Rule Synthesis
//!
//! Turns a natural-language explanation and an example card into rule source.
//! The text generation itself is external; this module builds the prompt,
//! extracts the code from the response and attaches it to the field.
//!
//! ## Flow
//!
//! ```text
//! begin_rule_synthesis ──→ generate(prompt) ──→ complete_rule_synthesis
//!   pins a snapshot          (external)           applies the source if the
//!   marks rule pending                            pending rule is still there
//! ```

use crate::{Document, EditorError};
use cardboard_model::{to_prompt_xml, ObjectId, RuleDefinition, RuleRecord, RuleState};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// External generator of rule source
pub trait RuleSynthesizer {
    /// Complete a prompt. `None` means no answer.
    fn generate(&mut self, prompt: &str) -> Option<String>;
}

/// Work handed to a [`RuleSynthesizer`]
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub field_id: ObjectId,
    pub rule_id: String,
    /// Version the example was captured at
    pub version: u64,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisOutcome {
    /// The source was attached to the field
    Applied { rule_id: String },
    /// The response carried no code; the pending rule was removed
    NoRule,
    /// The field or its pending rule changed in the meantime; nothing was done
    Stale,
}

const PROMPT_PREAMBLE: &str = r#"You are a coding assistant that helps write rules to add dynamic behavior to a white board app.

Here is how the white board works:

- A white board consists of nested cards and fields
- A card can contain other cards or fields
- cards and fields store their position relative to their parent card
- cards and fields can be copied and pasted
- If a card or field is copied it remembers from which object it was copied from
- There is a single root card that contains the entire white board content

Here is the schema of the objects on the white board:

```javascript

type Obj = {
  id: string;
  props: {
    x: number;
    y: number;
  }
  isCopyOf: (obj: Obj) => boolean;
  parent: () => Card | null;
}

type Card = Obj & {
  props: {
    width: number;
    height: number;
  }
  children: () => (Card | Field)[];
}

type Field = Obj & {
  props: {
    value: string;
  }
}

```

Here is how dynamic behavior is added to the white board:

- The user creates little example scenarios as a card that illustrate a dynamic behavior they want
- The user explains why the cards in the example should look the way they do on the example card
- You have to generate a javascript function that implements that dynamic behavior
- This function can reference the objects in the example card
- The function is then called for all objects on the white board
- the function should check if the object matches the scenario on the example card
- The function should consider objects matching if they are a copy of the object in the example card
- The function should also check if the object has the correct parent / sibling relationship as in the example card
- If the object is a match the function should mutate the object to match the scenario on the example card

# Examples

Example Card:

<card id="example" width="550" height="221" x="115" y="882" parentId="root">
  <card id="card1" width="434" height="58" x="60" y="77" parentId="example">
    <card id="card2" width="71" height="34" x="146" y="10" parentId="card1">
      <field id="field1" x="20" y="3" value="50" parentId="card2" />
    </card>
  </card>
</card>

User explanation:

"the knob shows the percentage value of the slider"

Response:

```javascript
const exampleSlider = getNode("card1")
const exampleKnob = getNode("card2")
const exampleField = getNode("field1")

addRule((obj) => {
  const field = obj
  if (!field.isCopyOf(exampleField)) {
    return
  }

  const knob = field.parent
  if (!knob || !knob.isCopyOf(exampleKnob)) {
    return
  }

  const slider = knob.parent
  if (!slider || !slider.isCopyOf(exampleSlider)) {
    return
  }

  field.props.value = (knob.props.x + knob.props.width / 2) / slider.props.width * 100
})
```

Now apply this to the following request:
"#;

/// Full prompt for an explanation and the example card rendered as XML
pub fn build_prompt(explanation: &str, example_xml: &str) -> String {
    format!(
        "{}\nExample Card:\n\n{}\nUser explanation: \"{}\"\n",
        PROMPT_PREAMBLE, example_xml, explanation
    )
}

fn code_block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)```javascript(?P<code>.*?)```").expect("valid code block regex")
    })
}

/// Body of the first fenced `javascript` block
pub fn extract_code_block(response: &str) -> Option<String> {
    code_block_pattern()
        .captures(response)
        .and_then(|captures| captures.name("code"))
        .map(|code| code.as_str().trim().to_string())
        .filter(|code| !code.is_empty())
}

impl Document {
    /// Start synthesizing a rule for `field_id`, using the card the field sits on as example.
    ///
    /// Pins the current state as the rule's baseline and marks the rule pending.
    pub fn begin_rule_synthesis(
        &mut self,
        field_id: &ObjectId,
        explanation: &str,
    ) -> Result<SynthesisRequest, EditorError> {
        let record = self.snapshot().get(field_id)?;
        if !record.is_field() {
            return Err(EditorError::NotAField(field_id.clone()));
        }
        let card_id = record
            .parent_id
            .clone()
            .ok_or_else(|| EditorError::NoExampleCard(field_id.clone()))?;

        let prompt = build_prompt(explanation, &to_prompt_xml(self.snapshot(), &card_id)?);
        let version = self.pin_snapshot();

        let rule_id = self.change(|store| {
            let rule_id = store.new_id().to_string();
            store.update_record(field_id, |record| {
                record.rule = Some(RuleRecord::pending(rule_id.clone(), version));
            });
            Ok::<_, EditorError>(rule_id)
        })?;

        info!(field = %field_id, rule = %rule_id, version, "Started rule synthesis");
        Ok(SynthesisRequest {
            field_id: field_id.clone(),
            rule_id,
            version,
            prompt,
        })
    }

    /// Finish a synthesis with the generator's response
    pub fn complete_rule_synthesis(
        &mut self,
        request: &SynthesisRequest,
        response: Option<&str>,
    ) -> Result<SynthesisOutcome, EditorError> {
        let still_pending = self
            .snapshot()
            .get(&request.field_id)
            .ok()
            .and_then(|record| record.rule.as_ref())
            .map_or(false, |rule| {
                rule.id == request.rule_id && rule.state() == RuleState::Pending
            });

        if !still_pending {
            warn!(field = %request.field_id, rule = %request.rule_id, "Dropping stale synthesis result");
            return Ok(SynthesisOutcome::Stale);
        }

        let source = response.and_then(extract_code_block);
        let outcome = match &source {
            Some(_) => SynthesisOutcome::Applied {
                rule_id: request.rule_id.clone(),
            },
            None => SynthesisOutcome::NoRule,
        };

        self.change(|store| {
            store.update_record(&request.field_id, |record| {
                record.rule = source.map(|source| RuleRecord {
                    id: request.rule_id.clone(),
                    created_at_version: request.version,
                    definition: Some(RuleDefinition {
                        source,
                        exceptions: Vec::new(),
                    }),
                });
            });
            Ok::<_, EditorError>(())
        })?;

        debug!(field = %request.field_id, outcome = ?outcome, "Completed rule synthesis");
        Ok(outcome)
    }

    /// Blocking convenience around the begin/complete pair
    pub fn synthesize_rule(
        &mut self,
        field_id: &ObjectId,
        explanation: &str,
        synthesizer: &mut dyn RuleSynthesizer,
    ) -> Result<SynthesisOutcome, EditorError> {
        let request = self.begin_rule_synthesis(field_id, explanation)?;
        let response = synthesizer.generate(&request.prompt);
        self.complete_rule_synthesis(&request, response.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_code_block() {
        let response = "Sure!\n```javascript\naddRule(obj => {})\n```\nDone.";
        assert_eq!(extract_code_block(response), Some("addRule(obj => {})".to_string()));
    }

    #[test]
    fn test_extract_code_block_requires_fence() {
        assert_eq!(extract_code_block("addRule(obj => {})"), None);
        assert_eq!(extract_code_block("```javascript\n```"), None);
        assert_eq!(extract_code_block("```python\nprint(1)\n```"), None);
    }

    #[test]
    fn test_prompt_contains_example_and_explanation() {
        let prompt = build_prompt("the bar fills up", "<card id=\"c\" />\n");
        assert!(prompt.starts_with("You are a coding assistant"));
        assert!(prompt.contains("Example Card:\n\n<card id=\"c\" />\n"));
        assert!(prompt.ends_with("User explanation: \"the bar fills up\"\n"));
    }
}
