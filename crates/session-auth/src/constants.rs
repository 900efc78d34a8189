//! Platform API constants
//!
//! Paths and storage keys shared by the web client and this gateway. The
//! storage keys match what the browser client keeps in local storage, so a
//! credential file can be seeded from an exported browser session.

/// Refresh endpoint, relative to the API base URL
pub const REFRESH_TOKEN_PATH: &str = "/auth/refresh-token";

/// Storage key for the access token
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
