use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use ring::digest::{digest, SHA256};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::info;
use wtransport::Identity;

const DEV_CERT_DIR: &str = "certs";
const DEV_CERT_FILE: &str = "certs/cert.pem";
const DEV_KEY_FILE: &str = "certs/key.pem";

/// Browsers only pin certificate hashes for certificates valid at most 14 days
const DEV_CERT_VALIDITY: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// TLS configuration for the WebTransport endpoint
pub struct TlsConfig {
    pub identity: Identity,
    /// Base64-encoded SHA-256 hash of the certificate (for browser pinning)
    pub cert_hash: String,
}

impl TlsConfig {
    /// Load the configured certificate, or the dev certificate under
    /// `certs/`, generating it first when missing
    pub async fn load(cert_path: Option<&str>, key_path: Option<&str>) -> Result<Self> {
        if let (Some(cert_path), Some(key_path)) = (cert_path, key_path) {
            info!("Loading TLS certificate from {}", cert_path);
            return Self::load_from_paths(cert_path, key_path).await;
        }

        if !(Path::new(DEV_CERT_FILE).exists() && Path::new(DEV_KEY_FILE).exists()) {
            generate_dev_cert(Path::new(DEV_CERT_DIR))?;
        }
        info!("Loading dev certificate from {}/", DEV_CERT_DIR);
        Self::load_from_paths(DEV_CERT_FILE, DEV_KEY_FILE).await
    }

    async fn load_from_paths(cert_path: &str, key_path: &str) -> Result<Self> {
        let identity = Identity::load_pemfiles(cert_path, key_path)
            .await
            .context("Failed to load certificate from PEM files")?;

        let cert_hash = Self::compute_cert_hash(&identity);
        info!("Certificate hash: {}", cert_hash);

        Ok(Self {
            identity,
            cert_hash,
        })
    }

    fn compute_cert_hash(identity: &Identity) -> String {
        identity
            .certificate_chain()
            .as_slice()
            .first()
            .map(|cert| hash_der(cert.der()))
            .unwrap_or_default()
    }

    pub fn cert_hash(&self) -> &str {
        &self.cert_hash
    }
}

fn hash_der(der: &[u8]) -> String {
    STANDARD.encode(digest(&SHA256, der).as_ref())
}

/// Write a self-signed localhost certificate and key into `dir`
pub fn generate_dev_cert(dir: &Path) -> Result<()> {
    info!("Generating development certificate in {}/", dir.display());
    fs::create_dir_all(dir).context("Failed to create certificate directory")?;

    let mut params = CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()])?;
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, "Skyward Dev");

    let now = SystemTime::now();
    params.not_before = now.into();
    params.not_after = (now + DEV_CERT_VALIDITY).into();

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    fs::write(dir.join("cert.pem"), cert.pem())?;
    fs::write(dir.join("key.pem"), key_pair.serialize_pem())?;
    Ok(())
}
