use serde::{Deserialize, Serialize};

use crate::error::{AssistantError, Result};

pub const DEFAULT_MAX_INPUT_CHARS: usize = 4000;

/// Name, status and version of the selected cluster, injected ahead of the
/// operator's question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterContext {
    pub name: String,
    pub status: String,
    pub version: String,
}

impl ClusterContext {
    pub fn context_line(&self) -> String {
        format!(
            "[EKS cluster context] name: {}, status: {}, version: {}",
            self.name, self.status, self.version
        )
    }
}

/// Rejects empty input and input over `max_chars` characters.
pub fn validate_input(text: &str, max_chars: usize) -> Result<()> {
    if text.trim().is_empty() {
        return Err(AssistantError::validation("input is empty"));
    }
    let len = text.chars().count();
    if len > max_chars {
        let detail = format!("input is {len} characters, limit is {max_chars}");
        return Err(AssistantError::validation(detail));
    }
    Ok(())
}

pub fn assemble_prompt(
    text: &str,
    cluster: Option<&ClusterContext>,
    max_chars: usize,
) -> Result<String> {
    validate_input(text, max_chars)?;
    Ok(match cluster {
        Some(c) => format!("{}\n\n{}", c.context_line(), text),
        None => text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo() -> ClusterContext {
        ClusterContext { name: "demo".into(), status: "ACTIVE".into(), version: "1.29".into() }
    }

    #[test]
    fn cluster_context_precedes_input() {
        let prompt =
            assemble_prompt("scale my app", Some(&demo()), DEFAULT_MAX_INPUT_CHARS).unwrap();
        let (first, rest) = prompt.split_once('\n').unwrap();
        assert!(first.contains("demo") && first.contains("ACTIVE") && first.contains("1.29"));
        assert_eq!(rest, "\nscale my app");
    }

    #[test]
    fn no_cluster_means_plain_input() {
        let prompt = assemble_prompt("list pods", None, DEFAULT_MAX_INPUT_CHARS).unwrap();
        assert_eq!(prompt, "list pods");
    }

    #[test]
    fn length_bound_is_inclusive() {
        let ok = "x".repeat(4000);
        assert!(assemble_prompt(&ok, None, DEFAULT_MAX_INPUT_CHARS).is_ok());
        let too_long = "x".repeat(4001);
        let err = assemble_prompt(&too_long, None, DEFAULT_MAX_INPUT_CHARS).unwrap_err();
        assert!(matches!(err, AssistantError::Validation(_)));
    }

    #[test]
    fn empty_and_blank_input_rejected() {
        for input in ["", "   \n\t"] {
            assert!(matches!(validate_input(input, 10), Err(AssistantError::Validation(_))));
        }
    }

    #[test]
    fn bound_counts_characters() {
        let hangul = "가".repeat(4000);
        assert!(validate_input(&hangul, DEFAULT_MAX_INPUT_CHARS).is_ok());
    }
}
