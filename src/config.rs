use secrecy::SecretBox;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: SecretBox<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    // セッション設定
    /// セッショントークンの有効期間（秒）
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: i64,

    // 2FA (TOTP) 設定
    /// TOTP発行者名（認証アプリに表示される）
    #[serde(default = "default_totp_issuer")]
    pub totp_issuer: String,
    /// TOTPコードの桁数（6〜8）
    #[serde(default = "default_totp_digits")]
    pub totp_digits: usize,
    /// TOTPタイムステップ（秒）
    #[serde(default = "default_totp_period")]
    pub totp_period: u64,
    /// 検証時に許容する前後のタイムステップ数（クロックずれ対策）
    #[serde(default = "default_totp_skew")]
    pub totp_skew: u8,
    /// AES-256暗号化キー（Base64エンコード、32バイト）
    pub encryption_key: SecretBox<String>,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SESSION_TTL_SECS: i64 = 60 * 60 * 24 * 7;
const DEFAULT_TOTP_ISSUER: &str = "mgmt-task";
const DEFAULT_TOTP_DIGITS: usize = 6;
const DEFAULT_TOTP_PERIOD: u64 = 30;
const DEFAULT_TOTP_SKEW: u8 = 1;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_session_ttl_secs() -> i64 {
    DEFAULT_SESSION_TTL_SECS
}

fn default_totp_issuer() -> String {
    DEFAULT_TOTP_ISSUER.to_string()
}

fn default_totp_digits() -> usize {
    DEFAULT_TOTP_DIGITS
}

fn default_totp_period() -> u64 {
    DEFAULT_TOTP_PERIOD
}

fn default_totp_skew() -> u8 {
    DEFAULT_TOTP_SKEW
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}
