use aes_gcm::{
    Aes256Gcm, Key, KeyInit, Nonce,
    aead::{Aead, OsRng},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// エンベロープ形式のバージョン
const ENVELOPE_VERSION: u8 = 1;
/// 96ビット nonce
const IV_LEN: usize = 12;
/// 128ビット認証タグ
const TAG_LEN: usize = 16;

/// 復号・エンベロープ処理のエラー
///
/// 改ざんまたは破損を示すため、呼び出し側で握りつぶしてはならない。
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Base64デコードに失敗: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("暗号化エンベロープの形式が不正: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("未対応のエンベロープバージョン: {0}")]
    UnsupportedVersion(u8),

    #[error("IVまたは認証タグの長さが不正")]
    InvalidLength,

    #[error("認証タグの検証に失敗")]
    Integrity,

    #[error("復号データがUTF-8ではない")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("暗号化に失敗")]
    Encrypt,
}

/// 保存用エンベロープ（各フィールドは標準Base64）
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u8,
    iv: String,
    ciphertext: String,
    tag: String,
}

/// TOTP シークレットの保存時暗号化 (AES-256-GCM)
///
/// # Security
/// - 鍵は環境シークレットの SHA-256
/// - 暗号化ごとにランダムな IV を生成
/// - 平文はログに出力しない
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    /// 環境シークレットから鍵を導出して作成
    pub fn new(secret: &str) -> Self {
        let key: [u8; 32] = Sha256::digest(secret.as_bytes()).into();
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        Self { cipher }
    }

    /// 文字列を暗号化し、保存用の不透明なトークンを返す
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        // aes-gcm は ciphertext || tag を返す
        let mut sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|e| {
                tracing::error!(error = ?e, "シークレット暗号化エラー");
                CipherError::Encrypt
            })?;
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        let envelope = Envelope {
            version: ENVELOPE_VERSION,
            iv: STANDARD.encode(iv),
            ciphertext: STANDARD.encode(&sealed),
            tag: STANDARD.encode(&tag),
        };

        Ok(STANDARD.encode(serde_json::to_vec(&envelope)?))
    }

    /// トークンを復号
    ///
    /// 認証タグ不一致・形式不正はすべてエラー（フォールバックなし）。
    pub fn decrypt(&self, token: &str) -> Result<String, CipherError> {
        let json = STANDARD.decode(token.trim())?;
        let envelope: Envelope = serde_json::from_slice(&json)?;

        if envelope.version != ENVELOPE_VERSION {
            return Err(CipherError::UnsupportedVersion(envelope.version));
        }

        let iv = STANDARD.decode(&envelope.iv)?;
        let mut sealed = STANDARD.decode(&envelope.ciphertext)?;
        let tag = STANDARD.decode(&envelope.tag)?;

        if iv.len() != IV_LEN || tag.len() != TAG_LEN {
            return Err(CipherError::InvalidLength);
        }

        sealed.extend_from_slice(&tag);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_ref())
            .map_err(|_| CipherError::Integrity)?;

        Ok(String::from_utf8(plaintext)?)
    }
}
