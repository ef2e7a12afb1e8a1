use crate::config::SigningSettings;
use crate::error::{PipelineError, Result};
use crate::tools::{run_checked, Invocation, ToolRunner};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignOutcome {
    Signed(PathBuf),
    /// No signing tool was available; the path is the untouched input.
    Unsigned(PathBuf),
}

impl SignOutcome {
    pub fn path(&self) -> &Path {
        match self {
            SignOutcome::Signed(p) | SignOutcome::Unsigned(p) => p,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, SignOutcome::Signed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeystoreStatus {
    Created,
    Existing,
    ToolMissing,
}

/// Debug-key signing through the JDK / build-tools executables.
pub struct Signer<'a> {
    runner: &'a dyn ToolRunner,
    settings: &'a SigningSettings,
    keystore: PathBuf,
}

impl<'a> Signer<'a> {
    pub fn new<P: AsRef<Path>>(
        runner: &'a dyn ToolRunner,
        settings: &'a SigningSettings,
        keystore: P,
    ) -> Self {
        Self {
            runner,
            settings,
            keystore: keystore.as_ref().to_path_buf(),
        }
    }

    pub fn keystore(&self) -> &Path {
        &self.keystore
    }

    pub fn keygen_invocation(&self) -> Invocation {
        let s = self.settings;
        Invocation::new("keytool")
            .args(["-genkeypair", "-v", "-keystore"])
            .arg(&self.keystore)
            .args(["-storepass", &s.store_password])
            .args(["-alias", &s.alias])
            .args(["-keypass", &s.key_password])
            .args(["-keyalg", &s.key_algorithm])
            .arg("-keysize")
            .arg(s.key_size.to_string())
            .arg("-validity")
            .arg(s.validity_days.to_string())
            .args(["-dname", &s.dname])
    }

    pub fn apksigner_invocation(&self, unsigned: &Path, signed: &Path) -> Invocation {
        let s = self.settings;
        Invocation::new("apksigner")
            .args(["sign", "--ks"])
            .arg(&self.keystore)
            .args(["--ks-key-alias", &s.alias])
            .arg("--ks-pass")
            .arg(format!("pass:{}", s.store_password))
            .arg("--key-pass")
            .arg(format!("pass:{}", s.key_password))
            .arg("--out")
            .arg(signed)
            .arg(unsigned)
    }

    pub fn jarsigner_invocation(&self, apk: &Path) -> Invocation {
        let s = self.settings;
        Invocation::new("jarsigner")
            .args(["-sigalg", "SHA256withRSA", "-digestalg", "SHA-256", "-keystore"])
            .arg(&self.keystore)
            .args(["-storepass", &s.store_password])
            .args(["-keypass", &s.key_password])
            .arg(apk)
            .arg(&s.alias)
    }

    /// Generates the debug key unless the keystore file already exists.
    pub fn ensure_keystore(&self) -> Result<KeystoreStatus> {
        if self.keystore.is_file() {
            return Ok(KeystoreStatus::Existing);
        }
        if let Some(parent) = self.keystore.parent() {
            fs::create_dir_all(parent)?;
        }

        info!("generating debug keystore {}", self.keystore.display());
        match run_checked(self.runner, &self.keygen_invocation()) {
            Ok(_) => Ok(KeystoreStatus::Created),
            Err(PipelineError::ToolNotFound(tool)) => {
                warn!("{} not found, cannot create a signing key", tool);
                Ok(KeystoreStatus::ToolMissing)
            }
            Err(e) => Err(e),
        }
    }

    /// Signs `unsigned` into `signed` with `apksigner`, or in place on a
    /// copy with `jarsigner` when `apksigner` is missing. Without any
    /// signing tool the unsigned package is handed back.
    pub fn sign(&self, unsigned: &Path, signed: &Path) -> Result<SignOutcome> {
        if self.ensure_keystore()? == KeystoreStatus::ToolMissing {
            warn!("leaving {} unsigned", unsigned.display());
            return Ok(SignOutcome::Unsigned(unsigned.to_path_buf()));
        }

        match run_checked(self.runner, &self.apksigner_invocation(unsigned, signed)) {
            Ok(_) => {
                info!("signed {}", signed.display());
                return Ok(SignOutcome::Signed(signed.to_path_buf()));
            }
            Err(PipelineError::ToolNotFound(_)) => {
                info!("apksigner not found, trying jarsigner");
            }
            Err(e) => return Err(e),
        }

        fs::copy(unsigned, signed)?;
        match run_checked(self.runner, &self.jarsigner_invocation(signed)) {
            Ok(_) => {
                info!("signed {}", signed.display());
                Ok(SignOutcome::Signed(signed.to_path_buf()))
            }
            Err(PipelineError::ToolNotFound(_)) => {
                fs::remove_file(signed)?;
                warn!(
                    "no signing tool available, leaving {} unsigned",
                    unsigned.display()
                );
                Ok(SignOutcome::Unsigned(unsigned.to_path_buf()))
            }
            Err(e) => {
                let _ = fs::remove_file(signed);
                Err(e)
            }
        }
    }
}
