//! Signup and login.

use reqwest::Method;
use serde::Serialize;

use super::error::{ApiError, ApiResult};
use super::types::AuthResponse;
use super::{ApiClient, expect_json};

#[derive(Serialize)]
struct SignupRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

fn require_field(name: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::validation(format!("{name} must not be empty")));
    }
    Ok(())
}

impl ApiClient {
    /// Register a new account.
    ///
    /// # Errors
    /// Returns a validation error for empty fields, or the backend error.
    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> ApiResult<AuthResponse> {
        require_field("username", username)?;
        require_field("email", email)?;
        require_field("password", password)?;

        let response = self
            .anonymous(Method::POST, "auth/signup")?
            .json(&SignupRequest {
                username: username.trim(),
                email: email.trim(),
                password,
            })
            .send()
            .await?;
        expect_json(response).await
    }

    /// Log into an existing account.
    ///
    /// # Errors
    /// Returns a validation error for empty fields, or the backend error.
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<AuthResponse> {
        require_field("username", username)?;
        require_field("password", password)?;

        let response = self
            .anonymous(Method::POST, "auth/login")?
            .json(&LoginRequest {
                username: username.trim(),
                password,
            })
            .send()
            .await?;
        expect_json(response).await
    }
}
