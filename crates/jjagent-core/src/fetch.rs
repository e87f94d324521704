//! HTTP fetcher used for approved `FetchUrl` requests.

use std::time::Duration;

use reqwest::redirect;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::guard::domain::host_allowed;
use crate::policy::CapabilityPolicy;
use crate::redact::Redactor;

/// Bodies are cut to this many characters after redaction.
pub const MAX_CONTENT_CHARS: usize = 10_000;

/// Raw bytes read from the wire before decoding. Leaves headroom for
/// multi-byte characters and for redaction shrinking the text.
const MAX_BODY_BYTES: usize = 64 * 1024;

const MAX_REDIRECTS: usize = 10;

/// Redacted, truncated response body plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub content: String,
    pub truncated: bool,
}

/// Thin wrapper over a `reqwest::Client` whose redirects stay inside the
/// policy's domain allowlist.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    redactor: Redactor,
}

impl Fetcher {
    pub fn new(policy: &CapabilityPolicy, version: &str) -> Result<Self, FetchError> {
        let domains = policy.network().allowed_domains.clone();
        let redirects = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                return attempt.error(format!("too many redirects (max {MAX_REDIRECTS})"));
            }
            let allowed = attempt
                .url()
                .host_str()
                .is_some_and(|host| host_allowed(host, &domains));
            let scheme_ok = matches!(attempt.url().scheme(), "http" | "https");
            if allowed && scheme_ok {
                attempt.follow()
            } else {
                let target = attempt.url().to_string();
                attempt.error(format!("redirect to {target} leaves allowed_domains"))
            }
        });

        let client = reqwest::Client::builder()
            .user_agent(format!("jj-agent/{version}"))
            .timeout(Duration::from_secs(policy.timeouts().fetch_seconds))
            .redirect(redirects)
            .build()?;

        Ok(Self {
            client,
            redactor: policy.redactor().clone(),
        })
    }

    /// GET `url`. Non-2xx final statuses are errors.
    pub async fn fetch(&self, url: Url) -> Result<FetchedPage, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: final_url,
            });
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let (body, capped) = read_capped(response, MAX_BODY_BYTES).await?;
        let body = String::from_utf8_lossy(&body);
        let (content, cut) = truncate_chars(&self.redactor.redact(&body), MAX_CONTENT_CHARS);

        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            content_type,
            content,
            truncated: cut || capped,
        })
    }
}

/// Read at most `cap` body bytes. The flag is set when the body was longer.
async fn read_capped(
    mut response: reqwest::Response,
    cap: usize,
) -> Result<(Vec<u8>, bool), FetchError> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = cap - body.len();
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            return Ok((body, true));
        }
        body.extend_from_slice(&chunk);
    }
    Ok((body, false))
}

fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    match text.char_indices().nth(max) {
        Some((cut, _)) => (text[..cut].to_string(), true),
        None => (text.to_string(), false),
    }
}
