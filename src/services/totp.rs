use aes_gcm::{
    Aes256Gcm, KeyInit, Nonce,
    aead::{Aead, OsRng},
};
use data_encoding::BASE32;
use rand::RngCore;
use totp_rs::{Algorithm, TOTP};

use crate::error::AppError;

/// 生成するシークレットの長さ（バイト）
/// Base32エンコード後は32文字になる
const SECRET_BYTES: usize = 20;

/// TOTP (Time-based One-Time Password) サービス
///
/// # Security
/// - シークレットはAES-256-GCMで暗号化してDB保存
/// - シークレット平文・コードはログに出力しない
/// - コード比較は totp-rs 内部で定数時間比較
#[derive(Clone)]
pub struct TotpService {
    issuer: String,
    digits: usize,
    period: u64,
    skew: u8,
    encryption_key: [u8; 32],
}

impl TotpService {
    /// 新しい TotpService を作成
    ///
    /// # Arguments
    /// * `issuer` - TOTP発行者名（認証アプリに表示される）
    /// * `digits` - コード桁数（RFC 6238 準拠で6〜8）
    /// * `period` - タイムステップ（秒）
    /// * `skew` - 検証時に許容する前後のタイムステップ数
    /// * `encryption_key_base64` - Base64エンコードされた32バイトの暗号化キー
    pub fn new(
        issuer: String,
        digits: usize,
        period: u64,
        skew: u8,
        encryption_key_base64: &str,
    ) -> Result<Self, AppError> {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        if !(6..=8).contains(&digits) {
            tracing::error!(digits, "TOTP桁数が不正");
            return Err(AppError::Internal(anyhow::anyhow!(
                "totp digits must be between 6 and 8"
            )));
        }

        let key_bytes = STANDARD.decode(encryption_key_base64).map_err(|e| {
            tracing::error!(error = ?e, "TOTP暗号化キーのBase64デコードエラー");
            AppError::Internal(anyhow::anyhow!("invalid encryption key format"))
        })?;

        if key_bytes.len() != 32 {
            tracing::error!(
                expected = 32,
                actual = key_bytes.len(),
                "TOTP暗号化キーの長さが不正"
            );
            return Err(AppError::Internal(anyhow::anyhow!(
                "encryption key must be 32 bytes"
            )));
        }

        let mut encryption_key = [0u8; 32];
        encryption_key.copy_from_slice(&key_bytes);

        Ok(Self {
            issuer,
            digits,
            period,
            skew,
            encryption_key,
        })
    }

    /// 20バイトのランダムシークレットを生成し、Base32でエンコード
    ///
    /// 乱数源はCSPRNG必須（予測可能な乱数はシークレットの総当たりを許す）
    pub fn generate_secret() -> String {
        let mut bytes = [0u8; SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        BASE32.encode(&bytes)
    }

    /// シークレットをAES-256-GCMで暗号化
    ///
    /// # Returns
    /// 96ビットnonce (12バイト) + 暗号文
    pub fn encrypt_secret(&self, secret: &str) -> Result<Vec<u8>, AppError> {
        let cipher = Aes256Gcm::new_from_slice(&self.encryption_key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            AppError::Internal(anyhow::anyhow!("cipher initialization error"))
        })?;

        // 96ビット (12バイト) のランダムnonce生成
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher.encrypt(nonce, secret.as_bytes()).map_err(|e| {
            tracing::error!(error = ?e, "シークレット暗号化エラー");
            AppError::Internal(anyhow::anyhow!("encryption error"))
        })?;

        let mut result = Vec::with_capacity(12 + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    /// 暗号化されたシークレットを復号
    pub fn decrypt_secret(&self, encrypted: &[u8]) -> Result<String, AppError> {
        if encrypted.len() < 12 {
            tracing::error!(len = encrypted.len(), "暗号化データが短すぎる");
            return Err(AppError::Internal(anyhow::anyhow!(
                "encrypted data too short"
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.encryption_key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            AppError::Internal(anyhow::anyhow!("cipher initialization error"))
        })?;

        let (nonce_bytes, ciphertext) = encrypted.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher.decrypt(nonce, ciphertext).map_err(|e| {
            tracing::error!(error = ?e, "シークレット復号エラー");
            AppError::Internal(anyhow::anyhow!("decryption error"))
        })?;

        String::from_utf8(plaintext).map_err(|e| {
            tracing::error!(error = ?e, "復号データのUTF-8変換エラー");
            AppError::Internal(anyhow::anyhow!("invalid utf8 after decryption"))
        })
    }

    /// otpauth:// プロビジョニングURIを構築
    ///
    /// issuer・アカウント名はパーセントエンコードされる
    pub fn provisioning_uri(&self, account: &str, secret: &str) -> Result<String, AppError> {
        Ok(self.create_totp(account, secret)?.get_url())
    }

    /// QRコードを生成（PNG形式、Base64エンコード）
    ///
    /// # Arguments
    /// * `account` - アカウント識別子（ユーザー名）
    /// * `secret` - Base32エンコードされたシークレット
    pub fn generate_qr_code(&self, account: &str, secret: &str) -> Result<String, AppError> {
        let totp = self.create_totp(account, secret)?;

        let qr_code = totp.get_qr_base64().map_err(|e| {
            tracing::error!(error = %e, "QRコード生成エラー");
            AppError::Internal(anyhow::anyhow!("qr code generation error"))
        })?;

        Ok(qr_code)
    }

    /// 指定Unix時刻のタイムステップに対するコードを計算
    ///
    /// RFC 6238: counter = floor(time / period)、
    /// HMAC-SHA1 を動的オフセットで切り出し 10^digits で剰余、ゼロ詰め
    pub fn code_at(&self, secret: &str, time: u64) -> Result<String, AppError> {
        let totp = self.create_totp_for_verify(secret)?;
        Ok(totp.generate(time))
    }

    /// TOTPコードを現在時刻で検証
    ///
    /// # Note
    /// 前後 `skew` ステップの時間ウィンドウを許容
    pub fn verify_code(&self, secret: &str, code: &str) -> Result<bool, AppError> {
        let current_time = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| {
                tracing::error!(error = ?e, "システム時刻取得エラー");
                AppError::Internal(anyhow::anyhow!("system time error"))
            })?
            .as_secs();

        self.verify_code_at(secret, code, current_time)
    }

    /// TOTPコードを指定時刻で検証
    ///
    /// 形式不正のコード（桁数違い・数字以外）はコード計算を行わず拒否する
    pub fn verify_code_at(&self, secret: &str, code: &str, time: u64) -> Result<bool, AppError> {
        if code.len() != self.digits || !code.chars().all(|c| c.is_ascii_digit()) {
            return Ok(false);
        }

        let totp = self.create_totp_for_verify(secret)?;

        // check は skew を考慮し、定数時間比較で検証する
        Ok(totp.check(code, time))
    }

    /// TOTP オブジェクトを作成（URI・QRコード生成用）
    fn create_totp(&self, account: &str, secret: &str) -> Result<TOTP, AppError> {
        let secret_bytes = BASE32.decode(secret.as_bytes()).map_err(|e| {
            tracing::error!(error = ?e, "シークレットのBase32デコードエラー");
            AppError::Internal(anyhow::anyhow!("invalid base32 secret"))
        })?;

        TOTP::new(
            Algorithm::SHA1,
            self.digits,
            self.skew,
            self.period,
            secret_bytes,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| {
            tracing::error!(error = %e, "TOTP作成エラー");
            AppError::Internal(anyhow::anyhow!("totp creation error"))
        })
    }

    /// TOTP オブジェクトを作成（検証用）
    fn create_totp_for_verify(&self, secret: &str) -> Result<TOTP, AppError> {
        let secret_bytes = BASE32.decode(secret.as_bytes()).map_err(|e| {
            tracing::error!(error = ?e, "シークレットのBase32デコードエラー");
            AppError::Internal(anyhow::anyhow!("invalid base32 secret"))
        })?;

        TOTP::new(
            Algorithm::SHA1,
            self.digits,
            self.skew,
            self.period,
            secret_bytes,
            None,
            String::new(),
        )
        .map_err(|e| {
            tracing::error!(error = %e, "TOTP作成エラー");
            AppError::Internal(anyhow::anyhow!("totp creation error"))
        })
    }
}
