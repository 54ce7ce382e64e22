//! Collapse the many shapes a RunPod worker may return into one string.
//!
//! Workers are free to return whatever JSON they like under `output`. The
//! shapes seen in practice are listed in [`OUTPUT_SHAPES`], tried in order;
//! the first whose predicate accepts the payload extracts the text. When
//! nothing matches, the whole status document is rendered as JSON instead of
//! failing.

use log::{debug, trace, warn};
use serde_json::Value;

use crate::error::Error;
use crate::request::{JobStatus, JobStatusResponse};

pub type Predicate = fn(&Value) -> bool;
pub type Extractor = fn(&Value) -> String;

/// A named output shape: if `matches`, `extract` is total on the payload
pub struct OutputShape
{   pub name: &'static str
  , pub matches: Predicate
  , pub extract: Extractor
}

/// Known payload shapes, in precedence order
pub const OUTPUT_SHAPES: &[OutputShape] = &[
    OutputShape { name: "string", matches: is_string, extract: string_value }
  , OutputShape { name: "text", matches: has_text, extract: text_field }
  , OutputShape { name: "content", matches: has_content, extract: content_field }
  , OutputShape { name: "choices.text", matches: has_choice_text, extract: choice_text }
  , OutputShape { name: "choices.message", matches: has_choice_message, extract: choice_message }
  , OutputShape { name: "choices.tokens", matches: has_choice_tokens, extract: choice_tokens }
  , OutputShape { name: "outputs.text", matches: has_outputs_text, extract: outputs_text }
  , OutputShape { name: "string list", matches: is_string_list, extract: join_strings }
  , OutputShape { name: "token batches", matches: is_token_batches, extract: token_batches }
  , OutputShape { name: "text list", matches: is_text_list, extract: join_texts }
];

/// Turn a job status document into the job's text.
///
/// Statuses other than COMPLETED are reported as [`Error::JobFailed`]. A
/// COMPLETED job never fails here.
pub fn normalize(response: &JobStatusResponse) -> Result<String, Error>
{   if response.status != JobStatus::Completed
    {   debug!(
          "Job {:?} not completed: {}",
          response.id, response.status
        );
        return Err(Error::JobFailed
        {   job_id: response.id.clone()
          , status: response.status.to_string()
          , error: response.error_text()
        });
    }

    if let Some(text) = response.output.as_ref().and_then(extract_output)
    {   return Ok(text);
    }

    warn!(
      "Unrecognized output for job {:?}, rendering whole response",
      response.id
    );
    Ok(render(response))
}

/// Text of the first shape that accepts `output`
pub fn extract_output(output: &Value) -> Option<String>
{   OUTPUT_SHAPES.iter()
      .find(|shape| (shape.matches)(output))
      .map(|shape| {
        trace!("Output matched shape: {}", shape.name);
        (shape.extract)(output)
      })
}

fn render(response: &JobStatusResponse) -> String
{   serde_json::to_string(response)
      .unwrap_or_else(|_| format!("{:?}", response))
}

// ===== Helpers =====

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str>
{   value.get(key).and_then(Value::as_str)
}

fn non_empty_array<'a>(value: &'a Value, key: &str) -> Option<&'a Vec<Value>>
{   value.get(key)
      .and_then(Value::as_array)
      .filter(|items| !items.is_empty())
}

fn first_choice(value: &Value) -> Option<&Value>
{   non_empty_array(value, "choices").and_then(|c| c.first())
}

fn tokens_of(choice: &Value) -> Option<&Vec<Value>>
{   choice.get("tokens")
      .and_then(Value::as_array)
      .filter(|tokens| tokens.iter().all(Value::is_string))
}

fn concat<'a>(parts: impl Iterator<Item = &'a str>) -> String
{   parts.collect()
}

// ===== Predicates and extractors =====

fn is_string(v: &Value) -> bool
{   v.is_string()
}

fn string_value(v: &Value) -> String
{   v.as_str().unwrap_or_default().to_string()
}

fn has_text(v: &Value) -> bool
{   str_field(v, "text").is_some()
}

fn text_field(v: &Value) -> String
{   str_field(v, "text").unwrap_or_default().to_string()
}

fn has_content(v: &Value) -> bool
{   str_field(v, "content").is_some()
}

fn content_field(v: &Value) -> String
{   str_field(v, "content").unwrap_or_default().to_string()
}

fn has_choice_text(v: &Value) -> bool
{   first_choice(v).and_then(|c| str_field(c, "text")).is_some()
}

fn choice_text(v: &Value) -> String
{   first_choice(v)
      .and_then(|c| str_field(c, "text"))
      .unwrap_or_default()
      .to_string()
}

fn message_content(choice: &Value) -> Option<&str>
{   choice.get("message").and_then(|m| str_field(m, "content"))
}

fn has_choice_message(v: &Value) -> bool
{   first_choice(v).and_then(message_content).is_some()
}

fn choice_message(v: &Value) -> String
{   first_choice(v)
      .and_then(message_content)
      .unwrap_or_default()
      .to_string()
}

fn has_choice_tokens(v: &Value) -> bool
{   non_empty_array(v, "choices")
      .map(|choices| choices.iter().all(|c| tokens_of(c).is_some()))
      .unwrap_or(false)
}

fn choice_tokens(v: &Value) -> String
{   concat(
      non_empty_array(v, "choices")
        .into_iter()
        .flatten()
        .filter_map(tokens_of)
        .flatten()
        .filter_map(Value::as_str)
    )
}

fn is_text_item(v: &Value) -> bool
{   str_field(v, "text").is_some()
}

fn has_outputs_text(v: &Value) -> bool
{   non_empty_array(v, "outputs")
      .map(|outputs| outputs.iter().all(is_text_item))
      .unwrap_or(false)
}

fn outputs_text(v: &Value) -> String
{   concat(
      non_empty_array(v, "outputs")
        .into_iter()
        .flatten()
        .filter_map(|o| str_field(o, "text"))
    )
}

fn non_empty_list(v: &Value) -> Option<&Vec<Value>>
{   v.as_array().filter(|items| !items.is_empty())
}

fn is_string_list(v: &Value) -> bool
{   non_empty_list(v)
      .map(|items| items.iter().all(Value::is_string))
      .unwrap_or(false)
}

fn join_strings(v: &Value) -> String
{   concat(
      non_empty_list(v).into_iter().flatten().filter_map(Value::as_str)
    )
}

fn is_token_batches(v: &Value) -> bool
{   non_empty_list(v)
      .map(|items| items.iter().all(has_choice_tokens))
      .unwrap_or(false)
}

fn token_batches(v: &Value) -> String
{   non_empty_list(v)
      .into_iter()
      .flatten()
      .map(choice_tokens)
      .collect()
}

fn is_text_list(v: &Value) -> bool
{   non_empty_list(v)
      .map(|items| items.iter().all(is_text_item))
      .unwrap_or(false)
}

fn join_texts(v: &Value) -> String
{   concat(
      non_empty_list(v)
        .into_iter()
        .flatten()
        .filter_map(|item| str_field(item, "text"))
    )
}
