//! Tool-using agent loop.
//!
//! The model is prompted to answer in a `Thought / Action / Action Input`
//! format.  Each requested action runs through the tools subsystem and its
//! result is fed back as an `Observation`; the loop ends at the first
//! `Final Answer` or after `max_steps` tool calls.
//!
//! Tool failures, unknown tools and malformed model output all become
//! observations (`ERROR [code]: message`) so the model can recover.

use tracing::{debug, warn};

use crate::supervisor::bus::{BusError, CapabilityDescriptor, ERR_INTERNAL};

use super::AgentsState;
use super::prompt::PromptBuilder;

const INSTRUCTIONS: &str = "\
Answer the question below as well as you can. You can use these tools:";

const FORMAT: &str = "\
Reply in exactly this format:

Thought: what you should do next
Action: the tool to use, one of [{{tool_names}}]
Action Input: the input for the tool
Observation: the tool result (written for you, never by you)

Thought/Action/Action Input/Observation may repeat. When you know the answer, reply:

Thought: I know the final answer
Final Answer: the answer to the question

Question: {{input}}
Thought:";

/// One parsed model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Action { tool: String, input: String },
    Final(String),
    Malformed(String),
}

/// Parse a model reply.  Returns the part of the reply worth keeping in the
/// scratchpad (anything after a self-written `Observation:` is dropped)
/// together with the parsed step.
pub fn parse_step(reply: &str) -> (&str, Step) {
    let kept = reply.find("\nObservation:").map_or(reply, |i| &reply[..i]);

    let action_at = kept.find("Action:");
    let final_at = kept.find("Final Answer:");

    let step = match (action_at, final_at) {
        (_, Some(f)) if action_at.is_none_or(|a| f < a) => {
            Step::Final(kept[f + "Final Answer:".len()..].trim().to_string())
        }
        (Some(a), _) => parse_action(&kept[a + "Action:".len()..]),
        _ => Step::Malformed("reply must contain 'Action:' or 'Final Answer:'".into()),
    };
    (kept, step)
}

fn parse_action(after: &str) -> Step {
    let (line, rest) = after.split_once('\n').unwrap_or((after, ""));
    let tool = line.trim().trim_matches(|c| c == '`' || c == '[' || c == ']').trim();
    if tool.is_empty() {
        return Step::Malformed("'Action:' names no tool".into());
    }
    let Some(at) = rest.find("Action Input:") else {
        return Step::Malformed("'Action:' must be followed by 'Action Input:'".into());
    };
    let input = rest[at + "Action Input:".len()..].trim();
    let input = input
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .filter(|s| !s.contains('"'))
        .unwrap_or(input);
    Step::Action { tool: tool.to_string(), input: input.to_string() }
}

/// The opening prompt: instructions, tool listing and the question.
pub fn initial_prompt(tools: &[CapabilityDescriptor], question: &str) -> String {
    PromptBuilder::new()
        .append(INSTRUCTIONS)
        .with_tools(tools)
        .append(FORMAT)
        .var("input", question)
        .build()
}

/// Run the loop until a final answer, or fail after `max_steps` tool calls.
pub async fn run(
    state: &AgentsState,
    channel_id: &str,
    question: &str,
    temperature: Option<f32>,
) -> Result<String, BusError> {
    let tools = state.list_tools().await?;
    let prompt = initial_prompt(&tools, question);
    let mut scratchpad = String::new();
    let mut steps = 0;

    loop {
        let reply = state
            .complete(channel_id, &format!("{prompt}{scratchpad}"), None, Vec::new(), temperature)
            .await?;
        let (kept, step) = parse_step(&reply);

        let observation = match step {
            Step::Final(answer) => {
                debug!(%channel_id, steps, "agent loop finished");
                return Ok(answer);
            }
            _ if steps >= state.max_steps => {
                warn!(%channel_id, steps, "agent loop exhausted its steps");
                return Err(BusError::new(ERR_INTERNAL, format!("agent stopped after {steps} steps")));
            }
            Step::Action { tool, input } => {
                debug!(%channel_id, step = steps + 1, %tool, "agent calls tool");
                match state.execute_tool(&tool, &input, channel_id).await? {
                    Ok(output) => output,
                    Err(failure) => format!("ERROR [{}]: {}", failure.code, failure.message),
                }
            }
            Step::Malformed(reason) => {
                debug!(%channel_id, step = steps + 1, %reason, "unparseable model reply");
                format!("ERROR [invalid_format]: {reason}")
            }
        };
        steps += 1;

        scratchpad.push(' ');
        scratchpad.push_str(kept.trim());
        scratchpad.push_str("\nObservation: ");
        scratchpad.push_str(observation.trim_end());
        scratchpad.push_str("\nThought:");
    }
}
