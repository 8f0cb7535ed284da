//! Probe for the local Ollama server behind the decider.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaModel {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<OllamaModel>,
}

/// List the models the server at `base_url` has pulled.
///
/// `Err(reason)` when the server is offline or answers with something other
/// than a tag list.
pub fn fetch_models(base_url: &str) -> Result<Vec<OllamaModel>, String> {
    let url = tags_url(base_url);
    let response = reqwest::blocking::get(&url)
        .map_err(|e| format!("Ollama unreachable at {url}: {e}"))?;

    if !response.status().is_success() {
        return Err(format!("Ollama returned HTTP {}", response.status()));
    }

    let tags: TagsResponse = response
        .json()
        .map_err(|e| format!("Failed to parse Ollama response: {e}"))?;
    Ok(tags.models)
}

/// Whether `model` (with or without a `:tag` suffix) is among `models`.
pub fn has_model(models: &[OllamaModel], model: &str) -> bool {
    models.iter().any(|m| {
        m.name == model || m.name.split_once(':').is_some_and(|(base, _)| base == model)
    })
}

fn tags_url(base_url: &str) -> String {
    format!("{}/api/tags", base_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models(names: &[&str]) -> Vec<OllamaModel> {
        names
            .iter()
            .map(|n| OllamaModel { name: n.to_string() })
            .collect()
    }

    #[test]
    fn tags_url_ignores_trailing_slash() {
        assert_eq!(tags_url("http://localhost:11434/"), "http://localhost:11434/api/tags");
    }

    #[test]
    fn model_match_accepts_bare_name() {
        let pulled = models(&["gemma3:latest", "llava:7b"]);
        assert!(has_model(&pulled, "gemma3"));
        assert!(has_model(&pulled, "llava:7b"));
        assert!(!has_model(&pulled, "llama3"));
    }

    #[test]
    fn unreachable_server_is_an_error() {
        // Port 9 (discard) is not an HTTP server.
        assert!(fetch_models("http://127.0.0.1:9").is_err());
    }
}
