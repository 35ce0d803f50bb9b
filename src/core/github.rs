//! Remote revision-comparison client.
//!
//! Fallback for change-set resolution when the local history cannot produce a
//! diff (shallow clones, force-pushed base revisions). Speaks the GitHub
//! compare API shape: `GET <endpoint>` returning `{ "files": [{ "filename":
//! ... }] }`.

use reqwest::blocking::{Client, Response};
use serde_json::{json, Value};

use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("kiln/", env!("CARGO_PKG_VERSION"));

/// Client for a configured compare endpoint.
///
/// `url_template` must contain `{base}` and `{head}` placeholders, e.g.
/// `https://api.github.com/repos/owner/repo/compare/{base}...{head}`.
pub struct CompareClient {
    client: Client,
    url_template: String,
    token: String,
}

impl CompareClient {
    pub fn new(url_template: &str, token: &str) -> Result<Self> {
        if !url_template.contains("{base}") || !url_template.contains("{head}") {
            return Err(Error::config_invalid_value(
                "compare.url_template",
                Some(url_template.to_string()),
                "template must contain {base} and {head} placeholders",
            ));
        }

        Ok(Self {
            client: Client::new(),
            url_template: url_template.to_string(),
            token: token.to_string(),
        })
    }

    /// Fetch the list of file paths changed between `base` and `head`.
    ///
    /// Ancestor search on the compare API is order-sensitive, so callers
    /// query both `(base, head)` and `(head, base)` and union the results.
    pub fn changed_files(&self, base: &str, head: &str) -> Result<Vec<String>> {
        let url = self
            .url_template
            .replace("{base}", base)
            .replace("{head}", head);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .send()
            .map_err(|e| {
                Error::remote_compare_failed(
                    format!("Compare request failed: {}", e),
                    json!({ "url": url, "error": e.to_string() }),
                )
            })?;

        parse_compare_response(response)
    }
}

fn parse_compare_response(response: Response) -> Result<Vec<String>> {
    let status = response.status();
    let body = response.text().map_err(|e| {
        Error::remote_compare_failed(
            format!("Failed to read compare response: {}", e),
            json!({ "error": e.to_string() }),
        )
    })?;

    if !status.is_success() {
        return Err(Error::remote_compare_failed(
            format!("Compare API returned HTTP {}", status.as_u16()),
            json!({ "status": status.as_u16(), "body": body }),
        ));
    }

    let payload: Value = serde_json::from_str(&body).map_err(|e| {
        Error::remote_response_invalid(format!("Compare response is not valid JSON: {}", e))
    })?;

    let files = payload
        .get("files")
        .and_then(|f| f.as_array())
        .ok_or_else(|| {
            Error::remote_response_invalid("Compare response has no 'files' array".to_string())
        })?;

    let mut paths = Vec::with_capacity(files.len());
    for file in files {
        let filename = file
            .get("filename")
            .and_then(|f| f.as_str())
            .ok_or_else(|| {
                Error::remote_response_invalid(
                    "Compare response entry has no 'filename' field".to_string(),
                )
            })?;
        paths.push(filename.to_string());
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_template_without_placeholders() {
        assert!(CompareClient::new("https://api.example.com/compare", "tok").is_err());
        assert!(CompareClient::new("https://api.example.com/compare/{base}", "tok").is_err());
        assert!(
            CompareClient::new("https://api.example.com/compare/{base}...{head}", "tok").is_ok()
        );
    }
}
