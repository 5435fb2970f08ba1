use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<LoginData>,
}

#[derive(Debug, Deserialize)]
pub struct LoginData {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct MeResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<MeData>,
}

#[derive(Debug, Deserialize)]
pub struct MeData {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct FsGetRequest {
    pub path: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct FsGetResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct PutResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}
