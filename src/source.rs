//! Fetching entry artifacts and module bundles.

use anyhow::Result;
use async_trait::async_trait;
use http_body_util::{BodyExt, Empty};
use hyper::Request;
use hyper::body::Bytes;
use hyper_util::rt::TokioIo;
use std::path::PathBuf;
use tokio::net::TcpStream;

/// Where entry artifacts and bundles come from.
#[async_trait]
pub trait EntrySource: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>>;
}

/// Fetches `http://`, `oci://`, `file://` and plain path URIs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UriSource;

#[async_trait]
impl EntrySource for UriSource {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        read_bytes(uri).await
    }
}

async fn read_bytes(uri: &str) -> Result<Vec<u8>> {
    if let Some(oci_ref) = uri.strip_prefix("oci://") {
        let client = wasm_pkg_client::oci::client::Client::new(Default::default());
        let image_ref = oci_ref.parse()?;
        let auth = oci_client::secrets::RegistryAuth::Anonymous;
        let media_types = vec!["application/json", "application/vnd.oci.image.layer.v1.tar"];

        let image_data = client.pull(&image_ref, &auth, media_types).await?;

        // Entry and bundle artifacts are single-layer
        if let Some(layer) = image_data.layers.first() {
            Ok(layer.data.to_vec())
        } else {
            Err(anyhow::anyhow!("No layers found in OCI image: {}", oci_ref))
        }
    } else if uri.starts_with("http://") {
        http_get(uri).await
    } else if uri.starts_with("https://") {
        Err(anyhow::anyhow!(
            "No TLS connector available for '{uri}'; serve remotes over http:// or oci://"
        ))
    } else {
        // Handle both file:// and plain paths
        let path = if let Some(path_str) = uri.strip_prefix("file://") {
            PathBuf::from(path_str)
        } else {
            PathBuf::from(uri)
        };
        Ok(tokio::fs::read(path).await?)
    }
}

async fn http_get(uri: &str) -> Result<Vec<u8>> {
    let url: hyper::Uri = uri.parse()?;
    // IPv6 hosts come bracketed, e.g. `[::1]`
    let host = url
        .host()
        .ok_or_else(|| anyhow::anyhow!("URI has no host: {uri}"))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let port = url.port_u16().unwrap_or(80);
    let authority = url
        .authority()
        .map(|a| a.to_string())
        .unwrap_or_else(|| host.clone());

    let stream = TcpStream::connect((host.as_str(), port)).await?;
    let (mut sender, connection) =
        hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!("Connection closed with error: {e}");
        }
    });

    let path = url
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/")
        .to_string();
    let request = Request::builder()
        .uri(path)
        .header(hyper::header::HOST, authority)
        .body(Empty::<Bytes>::new())?;
    let response = sender.send_request(request).await?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("GET {uri} returned {status}");
    }
    let body = response.into_body().collect().await?.to_bytes();
    Ok(body.to_vec())
}

/// Resolve a bundle location against the URI of the entry that declared it.
///
/// A leading `/` is origin-relative for `http://` and `https://` entries and a
/// filesystem path otherwise.
pub fn resolve_module_uri(entry_uri: &str, module: &str) -> String {
    if module.contains("://") {
        return module.to_string();
    }
    if module.starts_with('/') {
        if let Some((scheme, rest)) = entry_uri.split_once("://")
            && (scheme == "http" || scheme == "https")
        {
            let authority = rest.split_once('/').map_or(rest, |(authority, _)| authority);
            return format!("{scheme}://{authority}{module}");
        }
        return module.to_string();
    }
    let module = module.trim_start_matches("./");
    match entry_uri.rfind('/') {
        Some(index) => format!("{}/{}", &entry_uri[..index], module),
        None => module.to_string(),
    }
}
