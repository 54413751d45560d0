use std::sync::LazyLock;

use data_encoding::{BASE32_NOPAD, Encoding, Specification};
use rand::RngCore;
use time::OffsetDateTime;
use totp_rs::{Algorithm, TOTP};

/// RFC 4648 Base32 アルファベット
const BASE32_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
/// シークレット長（160ビット）
const SECRET_LEN: usize = 20;
/// u32 で扱える最大桁数
const MAX_DIGITS: usize = 8;

/// 末尾の端数ビットを検査しない Base32 デコーダ
static LENIENT_BASE32: LazyLock<Option<Encoding>> = LazyLock::new(|| {
    let mut spec = Specification::new();
    spec.symbols.push_str(BASE32_ALPHABET);
    spec.check_trailing_bits = false;
    spec.encoding().ok()
});

/// TOTP パラメータ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotpParams {
    /// 時間ステップ（秒）
    pub step: u64,
    /// 前後に許容するステップ数
    pub window: u64,
    /// コード桁数
    pub digits: usize,
    /// カウンタ起点（Unix秒）
    pub t0: u64,
}

impl Default for TotpParams {
    fn default() -> Self {
        Self {
            step: 30,
            window: 1,
            digits: 6,
            t0: 0,
        }
    }
}

/// TOTP (Time-based One-Time Password) サービス
///
/// # Security
/// - シークレット平文・コードはログに出力しない
/// - 保存時の暗号化は [`SecretCipher`](super::SecretCipher) が担当
#[derive(Debug, Clone)]
pub struct TotpService {
    issuer: String,
    params: TotpParams,
}

impl TotpService {
    /// 既定パラメータ（SHA1・6桁・30秒・前後1ステップ）で作成
    pub fn new(issuer: String) -> Self {
        Self::with_params(issuer, TotpParams::default())
    }

    pub fn with_params(issuer: String, params: TotpParams) -> Self {
        Self { issuer, params }
    }

    pub fn params(&self) -> TotpParams {
        self.params
    }

    /// 20バイトのランダムシークレットを生成し、Base32でエンコード
    pub fn generate_secret() -> String {
        Self::generate_secret_with_len(SECRET_LEN)
    }

    /// 指定バイト数のランダムシークレットを生成（パディングなし Base32）
    pub fn generate_secret_with_len(len: usize) -> String {
        let mut bytes = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut bytes);
        BASE32_NOPAD.encode(&bytes)
    }

    /// 認証アプリ登録用の otpauth:// URI を生成
    ///
    /// # Arguments
    /// * `account` - アカウント識別子（メールアドレス等）
    /// * `secret` - Base32エンコードされたシークレット
    pub fn enrollment_uri(&self, account: &str, secret: &str) -> String {
        let issuer = urlencoding::encode(&self.issuer);
        let account = urlencoding::encode(account);

        format!(
            "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits={}&period={}",
            self.params.digits, self.params.step
        )
    }

    /// HOTP (RFC 4226) を計算
    ///
    /// Base32 の不正文字は無視される。不正なシークレットでも例外にはならず、
    /// 一致しないコードが返るだけ。
    pub fn compute_hotp(secret: &str, counter: u64, digits: usize) -> String {
        let key = decode_secret_lenient(secret);
        let digits = digits.clamp(1, MAX_DIGITS);

        // step=1 にすると time がそのままカウンタになる
        TOTP::new_unchecked(Algorithm::SHA1, digits, 0, 1, key).generate(counter)
    }

    /// 現在時刻で TOTP コードを検証
    pub fn verify_code(&self, secret: &str, code: &str) -> bool {
        let now = OffsetDateTime::now_utc().unix_timestamp().max(0) as u64;
        self.verify_code_at(secret, code, now)
    }

    /// 指定時刻（Unix秒）で TOTP コードを検証
    ///
    /// # Note
    /// 前後 `window` ステップを許容。既定では ±30秒（実効90秒）。
    /// コードは使い捨てのため通常の文字列比較で十分。
    pub fn verify_code_at(&self, secret: &str, code: &str, unix_secs: u64) -> bool {
        let code: String = code.chars().filter(|c| !c.is_whitespace()).collect();
        if code.is_empty() {
            return false;
        }

        let counter = self.counter_at(unix_secs);
        let first = counter.saturating_sub(self.params.window);
        let last = counter.saturating_add(self.params.window);

        (first..=last).any(|c| Self::compute_hotp(secret, c, self.params.digits) == code)
    }

    /// `floor((t - t0) / step)`
    pub fn counter_at(&self, unix_secs: u64) -> u64 {
        unix_secs.saturating_sub(self.params.t0) / self.params.step.max(1)
    }
}

/// Base32 を寛容にデコード
///
/// 大文字化した上でアルファベット外の文字を捨て、8ビットに満たない末尾は切り捨てる。
fn decode_secret_lenient(secret: &str) -> Vec<u8> {
    let mut symbols: Vec<u8> = secret
        .bytes()
        .map(|b| b.to_ascii_uppercase())
        .filter(|b| BASE32_ALPHABET.as_bytes().contains(b))
        .collect();

    // 1/3/6 文字余りは1バイトにも満たない端数
    if matches!(symbols.len() % 8, 1 | 3 | 6) {
        symbols.pop();
    }

    LENIENT_BASE32
        .as_ref()
        .and_then(|encoding| encoding.decode(&symbols).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// RFC 4226 付録D のシークレット "12345678901234567890"
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";
    const RFC_CODES: [&str; 10] = [
        "755224", "287082", "359152", "969429", "338314", "254676", "287922", "162583",
        "399871", "520489",
    ];

    fn create_test_service() -> TotpService {
        TotpService::new("Anbudsmarkedet".to_string())
    }

    #[test]
    fn test_generate_secret() {
        let secret = TotpService::generate_secret();
        // Base32エンコードされた20バイト = 32文字
        assert_eq!(secret.len(), 32);
        assert!(secret.chars().all(|c| BASE32_ALPHABET.contains(c)));
        assert_ne!(secret, TotpService::generate_secret());
    }

    #[test]
    fn test_generate_secret_with_len() {
        let secret = TotpService::generate_secret_with_len(10);
        assert_eq!(secret.len(), 16);
        assert_eq!(decode_secret_lenient(&secret).len(), 10);
    }

    #[test]
    fn test_hotp_rfc4226_vectors() {
        for (counter, expected) in RFC_CODES.iter().enumerate() {
            assert_eq!(
                TotpService::compute_hotp(RFC_SECRET, counter as u64, 6),
                *expected
            );
        }
    }

    #[test]
    fn test_hotp_known_secret() {
        assert_eq!(TotpService::compute_hotp("JBSWY3DPEHPK3PXP", 0, 6), "282760");
        assert_eq!(TotpService::compute_hotp("JBSWY3DPEHPK3PXP", 1, 6), "996554");
    }

    #[test]
    fn test_hotp_lenient_decoding() {
        let canonical = TotpService::compute_hotp("JBSWY3DPEHPK3PXP", 7, 6);
        // 小文字・空白・不正文字は結果に影響しない
        assert_eq!(
            TotpService::compute_hotp("jbsw y3dp-ehpk 3pxp", 7, 6),
            canonical
        );
        assert_eq!(
            TotpService::compute_hotp("JBSWY3DPEHPK3PXP!!", 7, 6),
            canonical
        );
    }

    #[test]
    fn test_hotp_eight_digits() {
        // RFC 6238 付録B: T=59 の SHA1 8桁
        assert_eq!(TotpService::compute_hotp(RFC_SECRET, 1, 8), "94287082");
    }

    #[test]
    fn test_decode_drops_partial_trailing_symbol() {
        assert_eq!(decode_secret_lenient("MY"), b"f".to_vec());
        assert_eq!(decode_secret_lenient("MYZ"), b"f".to_vec());
        assert!(decode_secret_lenient("M").is_empty());
        assert!(decode_secret_lenient("").is_empty());
    }

    #[test]
    fn test_verify_current_counter() {
        let service = create_test_service();
        let secret = TotpService::generate_secret();
        let now = 1_700_000_000;

        let code = TotpService::compute_hotp(&secret, now / 30, 6);
        assert!(service.verify_code_at(&secret, &code, now));
    }

    #[test]
    fn test_verify_window() {
        let service = create_test_service();
        let counter = 56_666_666;
        let code = TotpService::compute_hotp(RFC_SECRET, counter, 6);

        // C-1, C, C+1 は許容
        for c in [counter - 1, counter, counter + 1] {
            assert!(service.verify_code_at(RFC_SECRET, &code, c * 30));
        }
        // C-2, C+2 は拒否（同じコードが偶然一致する場合を除く）
        for c in [counter - 2, counter + 2] {
            let collides = (c - 1..=c + 1)
                .any(|n| TotpService::compute_hotp(RFC_SECRET, n, 6) == code);
            assert_eq!(service.verify_code_at(RFC_SECRET, &code, c * 30), collides);
        }
    }

    #[test]
    fn test_verify_rejects_outside_window_rfc() {
        let service = create_test_service();
        // counter 0 のコードはカウンタ 2 以降では受理されない
        assert!(service.verify_code_at(RFC_SECRET, "755224", 30));
        assert!(!service.verify_code_at(RFC_SECRET, "755224", 60));
    }

    #[test]
    fn test_verify_strips_whitespace() {
        let service = create_test_service();
        assert!(service.verify_code_at(RFC_SECRET, " 287 082 ", 30));
    }

    #[test]
    fn test_verify_invalid_inputs() {
        let service = create_test_service();
        assert!(!service.verify_code_at(RFC_SECRET, "", 0));
        assert!(!service.verify_code_at(RFC_SECRET, "   ", 0));
        assert!(!service.verify_code_at(RFC_SECRET, "abcdef", 0));
        assert!(!service.verify_code_at("!!!", "755224", 0));
    }

    #[test]
    fn test_verify_with_t0() {
        let params = TotpParams {
            t0: 1_000,
            ..TotpParams::default()
        };
        let service = TotpService::with_params("Anbudsmarkedet".to_string(), params);
        assert_eq!(service.counter_at(1_000 + 30 * 5), 5);
        assert_eq!(service.counter_at(10), 0);
        assert!(service.verify_code_at(RFC_SECRET, "254676", 1_000 + 30 * 5));
    }

    #[test]
    fn test_verify_code_uses_wall_clock() {
        let service = create_test_service();
        let secret = TotpService::generate_secret();
        let now = OffsetDateTime::now_utc().unix_timestamp() as u64;
        let code = TotpService::compute_hotp(&secret, service.counter_at(now), 6);
        assert!(service.verify_code(&secret, &code));
    }

    #[test]
    fn test_enrollment_uri() {
        let service = create_test_service();
        let uri = service.enrollment_uri("admin@anbud.no", "JBSWY3DPEHPK3PXP");
        assert_eq!(
            uri,
            "otpauth://totp/Anbudsmarkedet:admin%40anbud.no?secret=JBSWY3DPEHPK3PXP&issuer=Anbudsmarkedet&algorithm=SHA1&digits=6&period=30"
        );
    }

    #[test]
    fn test_enrollment_uri_encodes_issuer() {
        let service = TotpService::new("Anbud Admin".to_string());
        let uri = service.enrollment_uri("ola", "ABC");
        assert!(uri.starts_with("otpauth://totp/Anbud%20Admin:ola?"));
        assert!(uri.contains("&issuer=Anbud%20Admin&"));
    }
}
