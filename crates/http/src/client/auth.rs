//! Authentication API client methods

use super::{ApiClient, ClientError};
use crate::types::{LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, UserProfile};
use reqwest::{Method, header};
use std::time::Duration;

pub const LOGIN_PATH: &str = "/api/login/";
pub const REFRESH_PATH: &str = "/api/token/refresh/";
pub const PROFILE_PATH: &str = "/api/profile/";

impl ApiClient {
    /// Exchange credentials for an access/refresh token pair
    pub async fn login(
        &self,
        request: &LoginRequest,
        timeout: Duration,
    ) -> Result<LoginResponse, ClientError> {
        let req = self
            .request(Method::POST, LOGIN_PATH)
            .timeout(timeout)
            .json(request);
        self.execute(req).await
    }

    /// Mint a new access token from a refresh token
    pub async fn refresh(
        &self,
        request: &RefreshRequest,
        timeout: Duration,
    ) -> Result<RefreshResponse, ClientError> {
        let req = self
            .request(Method::POST, REFRESH_PATH)
            .timeout(timeout)
            .json(request);
        self.execute(req).await
    }

    /// Fetch the profile of the user owning `access_token`
    pub async fn profile(&self, access_token: &str) -> Result<UserProfile, ClientError> {
        let req = self
            .request(Method::GET, PROFILE_PATH)
            .header(header::AUTHORIZATION, format!("Bearer {access_token}"));
        self.execute(req).await
    }
}
