use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use alloy_signer_local::PrivateKeySigner;
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{Engine as _, engine::general_purpose};
use console::Term;
use tracing::{info, warn};
use zeroize::{Zeroize, Zeroizing};

use super::ConfigError;
use crate::config::{WalletConfig, WalletKeyEntry};

const MAGIC: &[u8; 8] = b"SAWALLET";
const FORMAT_VERSION: u8 = 1;
const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 12;
const MAX_PASSWORD_ATTEMPTS: usize = 3;

pub struct UnlockedWallet {
    pub signer: PrivateKeySigner,
    pub remark: String,
}

impl std::fmt::Debug for UnlockedWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockedWallet")
            .field("address", &self.signer.address())
            .field("remark", &self.remark)
            .finish()
    }
}

/// 解锁配置中的加密私钥。
///
/// 密码优先读取 `wallet.password_env` 指定的环境变量（无终端的部署环境），
/// 否则在终端交互输入，最多尝试 [`MAX_PASSWORD_ATTEMPTS`] 次。
pub fn unlock_wallet(wallet: &WalletConfig) -> Result<UnlockedWallet, ConfigError> {
    if wallet.wallet_keys.is_empty() {
        return Err(ConfigError::Wallet(
            "wallet.wallet_keys 为空，请先执行 `safe-agent wallet add`".to_string(),
        ));
    }

    let selected = select_wallet_entry(&wallet.wallet_keys, wallet.selected.as_deref())
        .map_err(ConfigError::Wallet)?;
    let entry = &wallet.wallet_keys[selected];

    let cipher = general_purpose::STANDARD
        .decode(entry.encrypted.trim().as_bytes())
        .map_err(|err| {
            ConfigError::Wallet(format!("wallet_keys[{selected}] Base64 解码失败: {err}"))
        })?;

    if let Some(password) = password_from_env(&wallet.password_env) {
        let decrypted = decrypt_wallet_bytes(&cipher, password.as_ref()).map_err(|message| {
            ConfigError::Wallet(format!("{message}（密码来自环境变量 {}）", wallet.password_env))
        })?;
        return finish_unlock(decrypted, entry);
    }

    let mut attempts = 0usize;
    loop {
        attempts += 1;
        let password = prompt_existing_password().map_err(ConfigError::Wallet)?;

        match decrypt_wallet_bytes(&cipher, password.as_ref()) {
            Ok(decrypted) => return finish_unlock(decrypted, entry),
            Err(message) => {
                let remaining = MAX_PASSWORD_ATTEMPTS.saturating_sub(attempts);
                warn!(
                    target: "config",
                    attempts,
                    remaining,
                    remark = %entry.remark,
                    "钱包解密失败: {message}"
                );
                if remaining == 0 {
                    return Err(ConfigError::Wallet(format!(
                        "{message}（连续 {attempts} 次失败，已终止尝试）"
                    )));
                }
                println!("密码错误，还有 {} 次机会。", remaining);
            }
        }
    }
}

fn finish_unlock(
    decrypted: Zeroizing<String>,
    entry: &WalletKeyEntry,
) -> Result<UnlockedWallet, ConfigError> {
    let signer = parse_private_key(decrypted.as_str()).map_err(ConfigError::Wallet)?;
    info!(
        target: "config",
        remark = %entry.remark,
        address = %signer.address(),
        "钱包已解锁"
    );
    Ok(UnlockedWallet {
        signer,
        remark: entry.remark.clone(),
    })
}

fn password_from_env(name: &str) -> Option<Zeroizing<String>> {
    if name.trim().is_empty() {
        return None;
    }
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .map(Zeroizing::new)
}

pub fn parse_private_key(raw: &str) -> Result<PrivateKeySigner, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("私钥内容为空".to_string());
    }
    PrivateKeySigner::from_str(trimmed).map_err(|err| format!("解析私钥失败: {err}"))
}

/// 交互式录入一个新的加密私钥，并写回配置文件的 `wallet.wallet_keys`。
pub fn add_wallet_entry_interactive(
    wallet: &mut WalletConfig,
    config_path: &Path,
) -> Result<UnlockedWallet, ConfigError> {
    let term = Term::stderr();
    if !term.is_term() {
        return Err(ConfigError::Wallet("当前终端不支持交互式输入".to_string()));
    }

    let private_key = Zeroizing::new(
        read_masked(&term, "🔑 请输入私钥 (hex): ").map_err(ConfigError::Wallet)?,
    );
    let signer = parse_private_key(private_key.as_str()).map_err(ConfigError::Wallet)?;

    let remark = prompt_wallet_remark().map_err(ConfigError::Wallet)?;
    if wallet
        .wallet_keys
        .iter()
        .any(|entry| entry.remark.eq_ignore_ascii_case(&remark))
    {
        return Err(ConfigError::Wallet(format!(
            "备注名 \"{remark}\" 已存在，请使用其它名称"
        )));
    }

    let password = prompt_new_password(&term).map_err(ConfigError::Wallet)?;
    let encrypted =
        encrypt_wallet_key(private_key.as_bytes(), password.as_ref()).map_err(ConfigError::Wallet)?;

    let entry = WalletKeyEntry {
        remark: remark.clone(),
        encrypted: general_purpose::STANDARD.encode(encrypted),
    };
    wallet.wallet_keys.push(entry);

    persist_wallet_keys(config_path, &wallet.wallet_keys)?;
    info!(
        target: "config",
        path = %config_path.display(),
        address = %signer.address(),
        "已在配置中写入加密后的 wallet_keys 条目 \"{remark}\""
    );

    Ok(UnlockedWallet { signer, remark })
}

fn select_wallet_entry(entries: &[WalletKeyEntry], preferred: Option<&str>) -> Result<usize, String> {
    if let Some(remark) = preferred.map(str::trim).filter(|r| !r.is_empty()) {
        return entries
            .iter()
            .position(|entry| entry.remark.eq_ignore_ascii_case(remark))
            .ok_or_else(|| format!("未找到备注名为 \"{remark}\" 的钱包"));
    }

    if entries.len() == 1 {
        return Ok(0);
    }

    println!("检测到多个加密私钥，请输入序号：");
    for (idx, entry) in entries.iter().enumerate() {
        println!("  [{}] {}", idx + 1, entry.remark);
    }

    loop {
        let input = prompt_line("请输入序号: ")?;
        let trimmed = input.trim();
        if trimmed.is_empty() {
            println!("序号不能为空，请重试。");
            continue;
        }

        match trimmed.parse::<usize>() {
            Ok(value) if value >= 1 && value <= entries.len() => return Ok(value - 1),
            _ => println!("无效的序号，请输入 1-{} 之间的数字。", entries.len()),
        }
    }
}

/// 只替换 `wallet:` 段中的 `wallet_keys:` 块，保留文件其余内容与注释。
fn persist_wallet_keys(path: &Path, entries: &[WalletKeyEntry]) -> Result<(), ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let output = splice_wallet_keys(&contents, entries).map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })?;

    fs::write(path, output).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn splice_wallet_keys(contents: &str, entries: &[WalletKeyEntry]) -> Result<String, String> {
    let mut lines: Vec<String> = contents.lines().map(|line| line.to_string()).collect();
    let formatted = format_wallet_keys_lines(entries)?;

    let section = lines.iter().position(|line| line.trim_end() == "wallet:");
    match section {
        Some(section_start) => {
            let mut section_end = section_start + 1;
            while section_end < lines.len() {
                let current = &lines[section_end];
                if !current.trim().is_empty() && !is_indented(current) {
                    break;
                }
                section_end += 1;
            }

            let keys_start = (section_start + 1..section_end)
                .find(|&idx| lines[idx].trim_start().starts_with("wallet_keys:"));
            match keys_start {
                Some(start) => {
                    let key_indent = indentation(&lines[start]);
                    let mut end = start + 1;
                    while end < section_end {
                        let current = &lines[end];
                        if !current.trim().is_empty() && indentation(current) <= key_indent {
                            // YAML 允许序列项与父键同级缩进
                            if !current.trim_start().starts_with("- ") {
                                break;
                            }
                        }
                        end += 1;
                    }
                    lines.splice(start..end, formatted);
                }
                None => {
                    lines.splice(section_start + 1..section_start + 1, formatted);
                }
            }
        }
        None => {
            if lines.last().is_some_and(|line| !line.is_empty()) {
                lines.push(String::new());
            }
            lines.push("wallet:".to_string());
            lines.extend(formatted);
        }
    }

    let mut output = lines.join("\n");
    output.push('\n');
    Ok(output)
}

fn is_indented(line: &str) -> bool {
    line.starts_with(' ') || line.starts_with('\t')
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn format_wallet_keys_lines(entries: &[WalletKeyEntry]) -> Result<Vec<String>, String> {
    let mut lines = vec!["  wallet_keys:".to_string()];
    if entries.is_empty() {
        lines.push("    # 尚未配置加密私钥，执行 `safe-agent wallet add` 录入。".to_string());
        return Ok(lines);
    }

    let serialized =
        serde_yaml::to_string(entries).map_err(|err| format!("序列化 wallet_keys 失败: {err}"))?;
    for line in serialized.trim_end_matches('\n').lines() {
        lines.push(format!("    {line}"));
    }
    Ok(lines)
}

fn prompt_wallet_remark() -> Result<String, String> {
    loop {
        let remark = prompt_line("请输入该私钥的备注名: ")?;
        let trimmed = remark.trim();
        if trimmed.is_empty() {
            println!("备注名不能为空，请重新输入。");
            continue;
        }
        return Ok(trimmed.to_string());
    }
}

fn prompt_line(prompt: &str) -> Result<String, String> {
    print!("{prompt}");
    io::stdout()
        .flush()
        .map_err(|err| format!("刷新输出失败: {err}"))?;
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .map_err(|err| format!("读取输入失败: {err}"))?;
    Ok(input.trim_end_matches(&['\r', '\n'][..]).to_string())
}

fn prompt_new_password(term: &Term) -> Result<Zeroizing<String>, String> {
    loop {
        let password = Zeroizing::new(read_masked(term, "🔐 设置钱包密码: ")?);
        if password.is_empty() {
            println!("密码不能为空，请重新输入。");
            continue;
        }

        let confirmation = Zeroizing::new(read_masked(term, "🔐 确认钱包密码: ")?);
        if password != confirmation {
            println!("两次输入的密码不一致，请重试。");
            continue;
        }

        return Ok(password);
    }
}

fn prompt_existing_password() -> Result<Zeroizing<String>, String> {
    let term = Term::stderr();
    if !term.is_term() {
        return Err("当前终端不支持交互式输入，请通过环境变量提供钱包密码".to_string());
    }

    let password = read_masked(&term, "🔓 请输入钱包密码: ")?;
    if password.is_empty() {
        return Err("钱包密码不能为空".to_string());
    }
    Ok(Zeroizing::new(password))
}

fn read_masked(term: &Term, prompt: &str) -> Result<String, String> {
    term.write_str(prompt)
        .map_err(|err| format!("写入提示失败: {err}"))?;
    term.flush().map_err(|err| format!("刷新输出失败: {err}"))?;

    let mut buffer = String::new();
    loop {
        let ch = term
            .read_char()
            .map_err(|err| format!("读取输入失败: {err}"))?;

        match ch {
            '\n' | '\r' => {
                term.write_str("\n")
                    .map_err(|err| format!("写入换行失败: {err}"))?;
                break;
            }
            '\u{7f}' | '\u{8}' => {
                if buffer.pop().is_some() {
                    let _ = term.write_str("\u{8} \u{8}");
                }
            }
            c if c.is_control() => {}
            _ => {
                buffer.push(ch);
                term.write_str("*")
                    .map_err(|err| format!("写入掩码失败: {err}"))?;
            }
        }
        let _ = term.flush();
    }

    Ok(buffer)
}

pub(crate) fn encrypt_wallet_key(plaintext: &[u8], password: &str) -> Result<Vec<u8>, String> {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let mut encryption_key = derive_encryption_key(password, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&encryption_key)
        .map_err(|err| format!("初始化加密器失败: {err}"))?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|err| format!("加密钱包私钥失败: {err}"))?;

    encryption_key.zeroize();

    let mut data = Vec::with_capacity(MAGIC.len() + 1 + SALT_SIZE + NONCE_SIZE + ciphertext.len());
    data.extend_from_slice(MAGIC);
    data.push(FORMAT_VERSION);
    data.extend_from_slice(&salt);
    data.extend_from_slice(&nonce);
    data.extend_from_slice(&ciphertext);

    Ok(data)
}

pub(crate) fn decrypt_wallet_bytes(data: &[u8], password: &str) -> Result<Zeroizing<String>, String> {
    let header_len = MAGIC.len() + 1;
    if data.len() < header_len + SALT_SIZE + NONCE_SIZE {
        return Err("wallet_keys 数据格式错误".to_string());
    }

    let (magic, rest) = data.split_at(MAGIC.len());
    if magic != MAGIC {
        return Err("未知格式的 wallet 密文，请重新录入私钥".to_string());
    }

    let version = rest[0];
    if version != FORMAT_VERSION {
        return Err(format!("不支持的 wallet 密文版本: {version}"));
    }

    let rest = &rest[1..];

    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&rest[..SALT_SIZE]);

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&rest[SALT_SIZE..SALT_SIZE + NONCE_SIZE]);

    let ciphertext = &rest[SALT_SIZE + NONCE_SIZE..];

    let mut encryption_key = derive_encryption_key(password, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&encryption_key)
        .map_err(|err| format!("初始化解密器失败: {err}"))?;

    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext)
        .map_err(|_| "钱包密码错误或数据已损坏".to_string())?;

    encryption_key.zeroize();

    String::from_utf8(plaintext)
        .map(Zeroizing::new)
        .map_err(|err| format!("解析钱包私钥失败: {err}"))
}

fn derive_encryption_key(password: &str, salt: &[u8; SALT_SIZE]) -> Result<[u8; 32], String> {
    let params =
        Params::new(128 * 1024, 3, 4, Some(32)).map_err(|err| format!("Argon2 参数无效: {err}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = [0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|err| format!("派生加密密钥失败: {err}"))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    // anvil 默认账户 #0
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn entry(remark: &str) -> WalletKeyEntry {
        WalletKeyEntry {
            remark: remark.to_string(),
            encrypted: "AAAA".to_string(),
        }
    }

    #[test]
    fn encrypted_key_unlocks_only_with_matching_password() {
        let cipher = encrypt_wallet_key(TEST_KEY.as_bytes(), "hunter2").expect("encrypt");
        assert_eq!(&cipher[..MAGIC.len()], MAGIC);

        let plain = decrypt_wallet_bytes(&cipher, "hunter2").expect("decrypt");
        let signer = parse_private_key(plain.as_str()).expect("parse key");
        assert_eq!(
            signer.address().to_string(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );

        let err = decrypt_wallet_bytes(&cipher, "wrong").expect_err("wrong password");
        assert!(err.contains("钱包密码错误"));
    }

    #[test]
    fn truncated_cipher_is_rejected() {
        let err = decrypt_wallet_bytes(b"SAWALLET", "pw").expect_err("too short");
        assert!(err.contains("格式错误"));
    }

    #[test]
    fn preferred_remark_selects_entry() {
        let entries = vec![entry("ops"), entry("Agent")];
        assert_eq!(select_wallet_entry(&entries, Some("agent")), Ok(1));
        assert!(select_wallet_entry(&entries, Some("missing")).is_err());
        assert_eq!(select_wallet_entry(&entries[..1], None), Ok(0));
    }

    #[test]
    fn splice_replaces_existing_wallet_keys_block() {
        let original = "# agent config\nwallet:\n  password_env: PW\n  wallet_keys:\n    - remark: old\n      encrypted: AAAA\nserver:\n  listen: 0.0.0.0:3000\n";
        let output = splice_wallet_keys(original, &[entry("new")]).expect("splice");

        assert!(output.starts_with("# agent config\nwallet:\n  password_env: PW\n  wallet_keys:\n"));
        assert!(output.contains("remark: new"));
        assert!(!output.contains("remark: old"));
        assert!(output.contains("server:\n  listen: 0.0.0.0:3000\n"));

        let parsed: crate::config::SafeAgentConfig =
            serde_yaml::from_str(&output).expect("still valid yaml");
        assert_eq!(parsed.wallet.wallet_keys, vec![entry("new")]);
        assert_eq!(parsed.wallet.password_env, "PW");
    }

    #[test]
    fn splice_appends_wallet_section_when_absent() {
        let output = splice_wallet_keys("server:\n  listen: 127.0.0.1:1\n", &[entry("agent")])
            .expect("splice");
        let parsed: crate::config::SafeAgentConfig =
            serde_yaml::from_str(&output).expect("valid yaml");
        assert_eq!(parsed.wallet.wallet_keys, vec![entry("agent")]);
        assert_eq!(parsed.server.listen, "127.0.0.1:1");
    }
}
