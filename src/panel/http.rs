//! HTTP panel adapter
//!
//! Session-scraping client for the reseller panel: log in with a form POST,
//! keep the session cookie, drive the panel's form endpoints, log out. The
//! panel has no JSON API for most operations, so responses are checked for
//! textual success/failure markers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{PanelConnector, PanelError, PanelLogin, PanelSession};

/// Connector opening scraping sessions against a panel base URL
pub struct HttpPanelConnector {
    base_url: String,
    reseller_username: String,
    reseller_password: String,
}

impl HttpPanelConnector {
    pub fn new(base_url: String, reseller_username: String, reseller_password: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            reseller_username,
            reseller_password,
        }
    }
}

#[async_trait]
impl PanelConnector for HttpPanelConnector {
    async fn open(&self, login: PanelLogin<'_>) -> Result<Box<dyn PanelSession>, PanelError> {
        // Each session gets its own cookie jar; sessions must not share
        // authentication state.
        let client = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| PanelError::Transport(e.to_string()))?;

        let (username, password, login_path) = match login {
            PanelLogin::Reseller => (
                self.reseller_username.as_str(),
                self.reseller_password.as_str(),
                "/reseller/login",
            ),
            PanelLogin::Account { username, password } => (username, password, "/login"),
        };

        let url = format!("{}{}", self.base_url, login_path);
        let response = client
            .post(&url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(|e| PanelError::Transport(e.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| PanelError::Transport(e.to_string()))?;

        // The panel answers 200 for both outcomes; the dashboard marker is the
        // only reliable login signal.
        if !body.contains("dashboard") {
            return Err(PanelError::LoginFailed(format!(
                "no dashboard marker after login as {}",
                username
            )));
        }

        debug!(username = %username, "Panel session opened");
        Ok(Box::new(HttpPanelSession {
            base_url: self.base_url.clone(),
            client: Arc::new(client),
        }))
    }
}

struct HttpPanelSession {
    base_url: String,
    client: Arc<Client>,
}

impl HttpPanelSession {
    /// POST a form endpoint and check the body for the panel's error marker
    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<String, PanelError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .form(form)
            .send()
            .await
            .map_err(|e| PanelError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PanelError::Transport(e.to_string()))?;

        if !status.is_success() || body.contains("class=\"error\"") {
            return Err(PanelError::CallFailed(format!(
                "{} returned {}: {}",
                path,
                status,
                extract_error_text(&body)
            )));
        }
        Ok(body)
    }
}

#[async_trait]
impl PanelSession for HttpPanelSession {
    async fn create_account(
        &mut self,
        username: &str,
        password: &str,
        domain: &str,
        package: &str,
    ) -> Result<(), PanelError> {
        self.post_form(
            "/reseller/accounts/create",
            &[
                ("username", username),
                ("password", password),
                ("domain", domain),
                ("package", package),
            ],
        )
        .await
        .map(|_| ())
    }

    async fn suspend_account(&mut self, username: &str) -> Result<(), PanelError> {
        self.post_form("/reseller/accounts/suspend", &[("username", username)])
            .await
            .map(|_| ())
    }

    async fn unsuspend_account(&mut self, username: &str) -> Result<(), PanelError> {
        self.post_form("/reseller/accounts/unsuspend", &[("username", username)])
            .await
            .map(|_| ())
    }

    async fn delete_account(&mut self, username: &str) -> Result<(), PanelError> {
        self.post_form("/reseller/accounts/delete", &[("username", username)])
            .await
            .map(|_| ())
    }

    async fn list_databases(&mut self) -> Result<Vec<String>, PanelError> {
        let body = self.post_form("/panel/databases/list", &[]).await?;
        // One database name per line wrapped in a data row; the panel emits
        // `data-db="name"` attributes we can scrape without a full parser.
        let names = body
            .lines()
            .filter_map(|line| {
                let start = line.find("data-db=\"")? + "data-db=\"".len();
                let rest = &line[start..];
                let end = rest.find('"')?;
                Some(rest[..end].to_string())
            })
            .collect();
        Ok(names)
    }

    async fn create_database(&mut self, name: &str) -> Result<(), PanelError> {
        self.post_form("/panel/databases/create", &[("name", name)])
            .await
            .map(|_| ())
    }

    async fn drop_database(&mut self, name: &str) -> Result<(), PanelError> {
        self.post_form("/panel/databases/drop", &[("name", name)])
            .await
            .map(|_| ())
    }

    async fn upload_certificate(
        &mut self,
        domain: &str,
        private_key: &str,
        certificate: &str,
        ca_bundle: Option<&str>,
    ) -> Result<(), PanelError> {
        let mut form = vec![
            ("domain", domain),
            ("key", private_key),
            ("cert", certificate),
        ];
        if let Some(bundle) = ca_bundle {
            form.push(("cabundle", bundle));
        }
        self.post_form("/panel/ssl/upload", &form).await.map(|_| ())
    }

    async fn remove_certificate(&mut self, domain: &str) -> Result<(), PanelError> {
        self.post_form("/panel/ssl/remove", &[("domain", domain)])
            .await
            .map(|_| ())
    }

    async fn close(self: Box<Self>) -> Result<(), PanelError> {
        let url = format!("{}/logout", self.base_url);
        self.client
            .get(&url)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| PanelError::Transport(e.to_string()))
    }
}

/// Pull the first error line out of a panel response body
fn extract_error_text(body: &str) -> String {
    body.lines()
        .find(|line| line.contains("class=\"error\""))
        .map(|line| {
            line.trim()
                .trim_start_matches(|c| c != '>')
                .trim_start_matches('>')
                .trim_end_matches(|c| c != '<')
                .trim_end_matches('<')
                .to_string()
        })
        .unwrap_or_else(|| "unrecognized panel response".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_text() {
        let body = "<html>\n<div class=\"error\">Domain already exists</div>\n</html>";
        assert_eq!(extract_error_text(body), "Domain already exists");
    }

    #[test]
    fn test_extract_error_text_fallback() {
        assert_eq!(extract_error_text("<html></html>"), "unrecognized panel response");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let connector = HttpPanelConnector::new(
            "https://panel.example.net/".to_string(),
            "reseller".to_string(),
            "pw".to_string(),
        );
        assert_eq!(connector.base_url, "https://panel.example.net");
    }
}
