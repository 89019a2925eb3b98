//! HTTP collaborator
//!
//! The scraper only needs `request(method, url) -> response | none`.
//! Transport problems (DNS, TLS, timeouts) surface as `None`; retries and
//! pooling belong to the implementation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::blocking::Client;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
        }
    }
}

/// A fully read response
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Final URL after redirects
    pub url: String,
    /// Header names are stored lowercase
    headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, url: impl Into<String>) -> Self {
        Self {
            status,
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Header value, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Injected transport shared by every channel scrape
pub trait HttpClient: Send + Sync {
    /// Perform a request; `None` on transport failure
    fn request(&self, method: Method, url: &str) -> Option<HttpResponse>;

    /// No more requests are expected on the current pool
    fn reset(&self) {}
}

/// Default transport on a blocking `reqwest` client
pub struct ReqwestClient {
    user_agent: String,
    timeout: Duration,
    client: Mutex<Option<Client>>,
}

impl ReqwestClient {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.into(),
            timeout,
            client: Mutex::new(None),
        }
    }

    fn client(&self) -> Option<Client> {
        let mut guard = self.client.lock().ok()?;
        if guard.is_none() {
            let built = Client::builder()
                .user_agent(self.user_agent.clone())
                .timeout(self.timeout)
                .build();
            match built {
                Ok(client) => *guard = Some(client),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to build HTTP client");
                    return None;
                }
            }
        }
        guard.clone()
    }
}

impl HttpClient for ReqwestClient {
    fn request(&self, method: Method, url: &str) -> Option<HttpResponse> {
        let client = self.client()?;
        let builder = match method {
            Method::Get => client.get(url),
            Method::Head => client.head(url),
        };

        let response = match builder.send() {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(method = method.as_str(), url, error = %e, "request failed");
                return None;
            }
        };

        let mut out = HttpResponse::new(response.status().as_u16(), response.url().as_str());
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                out.headers.insert(name.as_str().to_string(), value.to_string());
            }
        }

        if method == Method::Get {
            match response.bytes() {
                Ok(body) => out.body = body.to_vec(),
                Err(e) => {
                    tracing::debug!(url, error = %e, "failed to read response body");
                    return None;
                }
            }
        }

        Some(out)
    }

    fn reset(&self) {
        if let Ok(mut guard) = self.client.lock() {
            *guard = None;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let response = HttpResponse::new(200, "https://example.com")
            .with_header("Last-Modified", "Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(
            response.header("last-modified"),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );
        assert_eq!(response.header("LAST-MODIFIED"), response.header("last-modified"));
        assert!(response.header("etag").is_none());
    }

    #[test]
    fn response_text_is_lossy() {
        let response = HttpResponse::new(200, "u").with_body(vec![b'o', b'k', 0xff]);
        assert!(response.text().starts_with("ok"));
        assert!(response.is_ok());
        assert!(!HttpResponse::new(404, "u").is_ok());
    }

    #[test]
    fn reqwest_client_reset_drops_pool() {
        let client = ReqwestClient::new("build-scout-test", Duration::from_secs(1));
        assert!(client.client().is_some());
        client.reset();
        assert!(client.client.lock().unwrap().is_none());
    }
}
