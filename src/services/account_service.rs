use crate::config::get_config;
use crate::error::{Error, Result};
use serde_json::{json, Value};

/// Client for the external identity directory (Clerk-compatible API).
/// Every call is bearer-keyed with the configured API key.
#[derive(Clone)]
pub struct AccountService {
    client: reqwest::Client,
}

/// Parameters for creating a directory user. `skip_password` provisions an
/// account the user activates through an invitation instead of a password.
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub skip_password: bool,
}

impl AccountService {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub async fn create_user(&self, account: &NewAccount) -> Result<String> {
        let config = get_config();

        let mut body = json!({});
        if let Some(email) = &account.email {
            body["email_address"] = json!([email]);
        }
        if let Some(username) = &account.username {
            body["username"] = json!(username);
        }
        if let Some(password) = &account.password {
            body["password"] = json!(password);
        }
        if let Some(first_name) = &account.first_name {
            body["first_name"] = json!(first_name);
        }
        if let Some(last_name) = &account.last_name {
            body["last_name"] = json!(last_name);
        }
        if account.skip_password {
            body["skip_password_requirement"] = json!(true);
        }

        let response = self
            .client
            .post(format!("{}/users", config.identity_api_url))
            .bearer_auth(&config.identity_api_key)
            .json(&body)
            .send()
            .await?;

        let payload = Self::check(response).await?;
        payload["id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| Error::Internal("Directory response missing user id".to_string()))
    }

    pub async fn delete_user(&self, clerk_id: &str) -> Result<()> {
        let config = get_config();
        let response = self
            .client
            .delete(format!("{}/users/{}", config.identity_api_url, clerk_id))
            .bearer_auth(&config.identity_api_key)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Sends an email invitation; returns the invitation id.
    pub async fn invite_by_email(&self, email: &str) -> Result<String> {
        let config = get_config();
        let response = self
            .client
            .post(format!("{}/invitations", config.identity_api_url))
            .bearer_auth(&config.identity_api_key)
            .json(&json!({
                "email_address": email,
                "redirect_url": config.invite_redirect_url,
            }))
            .send()
            .await?;

        let payload = Self::check(response).await?;
        payload["id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| Error::Internal("Directory response missing invitation id".to_string()))
    }

    pub async fn cancel_invitation(&self, invitation_id: &str) -> Result<()> {
        let config = get_config();
        let response = self
            .client
            .post(format!(
                "{}/invitations/{}/revoke",
                config.identity_api_url, invitation_id
            ))
            .bearer_auth(&config.identity_api_key)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Surfaces provider rejections with their own message; client-caused
    /// failures come back as 400, everything else as 500.
    async fn check(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if status.is_success() {
            if status == reqwest::StatusCode::NO_CONTENT {
                return Ok(Value::Null);
            }
            return Ok(response.json::<Value>().await.unwrap_or(Value::Null));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                v["errors"][0]["message"]
                    .as_str()
                    .map(String::from)
            })
            .unwrap_or(body);

        tracing::warn!(status = %status, %message, "directory call failed");
        if status.is_client_error() {
            Err(Error::BadRequest(format!("Directory error: {}", message)))
        } else {
            Err(Error::Internal(format!("Directory error: {}", message)))
        }
    }
}

impl Default for AccountService {
    fn default() -> Self {
        Self::new()
    }
}
