use crate::utils;
use alloy_primitives::B256;
use clap::{Parser, ValueHint};
use eyre::{Result, WrapErr};
use kestrel_wallets::KeyStore;
use std::path::{Path, PathBuf};

/// Encrypt a private key or secret phrase into a key store file.
#[derive(Clone, Debug, Parser)]
pub struct ImportArgs {
    /// Where to write the key store.
    #[arg(value_hint = ValueHint::FilePath)]
    pub out: PathBuf,

    /// Import a BIP-39 secret phrase instead of a private key.
    #[arg(long)]
    pub phrase: bool,

    /// Account index on the BIP-44 path of the secret phrase.
    #[arg(long, default_value_t = 0, requires = "phrase")]
    pub index: u32,

    /// Directory for the encrypted key file. Defaults to the directory of the key store.
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub keystore_dir: Option<PathBuf>,

    /// The session secret to encrypt with. Prompted for when unset.
    #[arg(long, env = "KESTREL_SESSION_SECRET", hide_env_values = true)]
    pub secret: Option<String>,
}

impl ImportArgs {
    pub fn run(self) -> Result<()> {
        let secret = utils::session_secret(self.secret)?;
        let dir = self.keystore_dir.clone().unwrap_or_else(|| default_keystore_dir(&self.out));
        std::fs::create_dir_all(&dir)
            .wrap_err_with(|| format!("failed to create {}", dir.display()))?;

        let key_store = if self.phrase {
            let phrase = rpassword::prompt_password("Secret phrase: ")?;
            KeyStore::import_secret_phrase(&phrase, self.index, &secret, &dir)?
        } else {
            let key: B256 = rpassword::prompt_password("Private key: ")?
                .trim()
                .parse()
                .wrap_err("invalid private key")?;
            KeyStore::import_private_key(key, &secret, &dir)?
        };

        let json = serde_json::to_string_pretty(&key_store)?;
        std::fs::write(&self.out, json)
            .wrap_err_with(|| format!("failed to write {}", self.out.display()))?;
        println!("Imported {} into {}", key_store.address(), self.out.display());
        Ok(())
    }
}

fn default_keystore_dir(out: &Path) -> PathBuf {
    match out.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_file_defaults_next_to_the_key_store() {
        assert_eq!(default_keystore_dir(Path::new("accounts/dev.json")), Path::new("accounts"));
        assert_eq!(default_keystore_dir(Path::new("dev.json")), Path::new("."));
    }
}
