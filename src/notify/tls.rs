use super::NotifyError;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const SYSTEM_CA_BUNDLES: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt",
    "/etc/pki/tls/certs/ca-bundle.crt",
    "/etc/ssl/ca-bundle.pem",
    "/etc/ssl/cert.pem",
];

/// Client config for STARTTLS, trusting `ca_file` or the first system bundle found.
pub fn client_config(ca_file: Option<&Path>) -> Result<Arc<ClientConfig>, NotifyError> {
    let path = match ca_file {
        Some(path) => path.to_path_buf(),
        None => SYSTEM_CA_BUNDLES
            .iter()
            .map(PathBuf::from)
            .find(|p| p.is_file())
            .ok_or_else(|| NotifyError::TrustRoots("no system CA bundle found".to_string()))?,
    };
    let roots = load_roots(&path)?;
    debug!(path = %path.display(), roots = roots.len(), "loaded smtp trust roots");

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

pub fn load_roots(path: &Path) -> Result<RootCertStore, NotifyError> {
    let fail = |reason: String| NotifyError::TrustRoots(format!("{}: {reason}", path.display()));
    let file = File::open(path).map_err(|e| fail(e.to_string()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| fail(e.to_string()))?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if ignored > 0 {
        debug!(path = %path.display(), ignored, "skipped unparsable certificates");
    }
    if added == 0 {
        return Err(fail("no usable certificates".to_string()));
    }
    Ok(roots)
}

pub fn server_name(host: &str) -> Result<ServerName<'static>, NotifyError> {
    ServerName::try_from(host.to_string()).map_err(|_| NotifyError::ServerName(host.to_string()))
}
