use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

use crate::codec::Oid;
use crate::object::{self, FormatError, Mode, ObjectKind};
use crate::pack::{self, PackError};
use crate::pktline::{self, PktLine};
use crate::store::{LooseStore, StoreError};

const SERVICE: &str = "git-upload-pack";

#[derive(Debug, Error)]
pub enum CloneError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Pack(#[from] PackError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("remote protocol error: {0}")]
    Protocol(String),
}

pub struct RemoteRefs {
    pub refs: BTreeMap<String, Oid>,
    pub capabilities: Vec<String>,
}

impl RemoteRefs {
    pub fn head(&self) -> Option<Oid> {
        self.refs.get("HEAD").copied()
    }
}

/// `GET <url>/info/refs?service=git-upload-pack`: parse the pkt-line
/// response into a ref-name → id map plus the server's capability list.
pub fn discover(client: &reqwest::blocking::Client, url: &str) -> Result<RemoteRefs, CloneError> {
    let discover_url = format!("{url}/info/refs?service={SERVICE}");
    let resp = client.get(&discover_url).send()?.error_for_status()?;
    let body = resp.bytes()?;
    parse_discover_body(&body)
}

fn parse_discover_body(body: &[u8]) -> Result<RemoteRefs, CloneError> {
    let mut data: &[u8] = body;
    let (first, consumed) = pktline::read(data)?;
    match first {
        PktLine::Data(line) if line.starts_with(b"# service=") => {}
        _ => return Err(CloneError::Protocol("missing service announcement line".into())),
    }
    data = &data[consumed..];

    // flush terminating the service announcement
    let (flush, consumed) = pktline::read(data)?;
    if !matches!(flush, PktLine::Flush) {
        return Err(CloneError::Protocol("expected flush after service line".into()));
    }
    data = &data[consumed..];

    let lines = pktline::read_all(data)?;
    let mut refs = BTreeMap::new();
    let mut capabilities = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let (ref_part, caps) = match line.iter().position(|&b| b == 0) {
            Some(nul) if i == 0 => (&line[..nul], Some(&line[nul + 1..])),
            _ => (line, None),
        };
        if let Some(caps) = caps {
            capabilities = std::str::from_utf8(caps)
                .unwrap_or_default()
                .split_whitespace()
                .map(str::to_string)
                .collect();
        }

        let text = std::str::from_utf8(ref_part)
            .map_err(|_| CloneError::Protocol("ref line is not valid UTF-8".into()))?;
        let (sha, name) = text
            .split_once(' ')
            .ok_or_else(|| CloneError::Protocol(format!("malformed ref line '{text}'")))?;
        let id = Oid::from_hex(sha).map_err(|e| CloneError::Protocol(e.to_string()))?;
        refs.insert(name.to_string(), id);
    }

    Ok(RemoteRefs { refs, capabilities })
}

/// `POST <url>/git-upload-pack`: send a single `want` for `head`, read
/// back the NAK/ACK line(s), then demultiplex the pack bytes out of the
/// side-band channels (or take them raw if side-band wasn't negotiated).
pub fn fetch_pack(
    client: &reqwest::blocking::Client,
    url: &str,
    head: Oid,
    server_capabilities: &[String],
) -> Result<Vec<u8>, CloneError> {
    let use_side_band = server_capabilities
        .iter()
        .any(|c| c == "side-band-64k" || c == "side-band");

    let mut want_line = format!("want {head}");
    if use_side_band {
        want_line.push_str(" side-band-64k");
    }
    want_line.push('\n');

    let mut body = pktline::encode(want_line.as_bytes());
    body.extend_from_slice(pktline::FLUSH);
    body.extend_from_slice(&pktline::encode(b"done\n"));

    let upload_url = format!("{url}/{SERVICE}");
    let resp = client
        .post(&upload_url)
        .header(reqwest::header::CONTENT_TYPE, "application/x-git-upload-pack-request")
        .body(body)
        .send()?
        .error_for_status()?;
    let response_body = resp.bytes()?;
    let mut data: &[u8] = &response_body;

    // Leading ACK/NAK line(s).
    loop {
        let (line, consumed) = pktline::read(data)?;
        data = &data[consumed..];
        match line {
            PktLine::Data(payload) if payload.starts_with(b"NAK") => break,
            PktLine::Data(payload) if payload.starts_with(b"ACK") => continue,
            PktLine::Data(other) => {
                return Err(CloneError::Protocol(format!(
                    "expected NAK/ACK, got '{}'",
                    String::from_utf8_lossy(other)
                )))
            }
            PktLine::Flush => {
                return Err(CloneError::Protocol("unexpected flush before pack data".into()))
            }
        }
    }

    if data.starts_with(b"PACK") {
        return Ok(data.to_vec());
    }

    // Side-band framed: demultiplex channel 1 (pack), discard channel 2
    // (progress), surface channel 3 (fatal error) as a protocol error.
    let mut pack_bytes = Vec::new();
    while !data.is_empty() {
        let (line, consumed) = pktline::read(data)?;
        data = &data[consumed..];
        match line {
            PktLine::Flush => break,
            PktLine::Data(payload) => {
                let Some((&channel, rest)) = payload.split_first() else {
                    continue;
                };
                match channel {
                    1 => pack_bytes.extend_from_slice(rest),
                    2 => warn!(progress = %String::from_utf8_lossy(rest), "remote progress"),
                    3 => {
                        return Err(CloneError::Protocol(format!(
                            "remote error: {}",
                            String::from_utf8_lossy(rest)
                        )))
                    }
                    other => {
                        return Err(CloneError::Protocol(format!("unknown side-band channel {other}")))
                    }
                }
            }
        }
    }

    if !pack_bytes.starts_with(b"PACK") {
        return Err(CloneError::Protocol("no PACK data in response".into()));
    }
    Ok(pack_bytes)
}

/// Drive a full clone into `dest`: discover → want → receive → import →
/// checkout, per §4.5. Failure at any stage is fatal; objects already
/// imported are left in place.
pub fn clone(url: &str, dest: &Path) -> Result<(), CloneError> {
    let url = url.trim_end_matches('/');
    let store = LooseStore::init(&dest.join(".git"))?;
    let git_dir = store.git_dir().to_path_buf();

    let client = reqwest::blocking::Client::new();
    let remote = discover(&client, url)?;
    let head = remote
        .head()
        .ok_or_else(|| CloneError::Protocol("remote has no HEAD ref".into()))?;

    let pack_bytes = fetch_pack(&client, url, head, &remote.capabilities)?;
    info!(bytes = pack_bytes.len(), "received pack");

    let objects = pack::parse_pack(&pack_bytes)?;
    info!(count = objects.len(), "resolved pack objects");
    for object in &objects {
        let written_id = store.write(object.kind, &object.payload)?;
        debug_assert_eq!(written_id, object.id, "pack and store disagree on object id");
    }

    let (kind, payload) = store.read(&head, false)?;
    if kind != ObjectKind::Commit {
        return Err(CloneError::Protocol("HEAD does not reference a commit".into()));
    }
    let commit = object::parse_commit(&payload)?;

    checkout_tree(&store, &commit.tree, dest)?;

    fs::write(git_dir.join("refs/heads/main"), format!("{head}\n"))?;
    fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n")?;

    Ok(())
}

fn checkout_tree(store: &LooseStore, tree_id: &Oid, dir: &Path) -> Result<(), CloneError> {
    let (kind, payload) = store.read(tree_id, false)?;
    if kind != ObjectKind::Tree {
        return Err(CloneError::Protocol(format!("{tree_id} is not a tree")));
    }

    for entry in object::parse_tree(&payload)? {
        let path = dir.join(entry_name_to_os_str(&entry.name));

        if entry.mode.is_dir() {
            fs::create_dir_all(&path)?;
            checkout_tree(store, &entry.id, &path)?;
        } else {
            let (blob_kind, blob_payload) = store.read(&entry.id, false)?;
            if blob_kind != ObjectKind::Blob {
                return Err(CloneError::Protocol(format!("{} is not a blob", entry.id)));
            }
            fs::write(&path, &blob_payload)?;
            if entry.mode == Mode::Executable {
                set_executable(&path)?;
            }
        }
    }

    Ok(())
}

/// Tree entry names are raw file-system bytes, not necessarily valid
/// UTF-8 (spec §9's string-vs-bytes discipline) — decode them only as
/// far as the platform's path type requires, never through a lossy
/// text conversion.
#[cfg(unix)]
fn entry_name_to_os_str(name: &[u8]) -> &std::ffi::OsStr {
    use std::os::unix::ffi::OsStrExt;
    std::ffi::OsStr::from_bytes(name)
}

#[cfg(not(unix))]
fn entry_name_to_os_str(name: &[u8]) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(name)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_parses_capabilities_and_refs() {
        let mut body = pktline::encode(b"# service=git-upload-pack\n");
        body.extend_from_slice(pktline::FLUSH);
        body.extend_from_slice(&pktline::encode(
            b"6c073b08f7987018cbb2cb9a5747c84913b3608e HEAD\0multi_ack side-band-64k ofs-delta\n",
        ));
        body.extend_from_slice(&pktline::encode(
            b"6c073b08f7987018cbb2cb9a5747c84913b3608e refs/heads/master\n",
        ));
        body.extend_from_slice(pktline::FLUSH);

        let remote = parse_discover_body(&body).unwrap();
        assert_eq!(
            remote.head().unwrap().to_hex(),
            "6c073b08f7987018cbb2cb9a5747c84913b3608e"
        );
        assert!(remote.capabilities.contains(&"side-band-64k".to_string()));
        assert_eq!(remote.refs.len(), 2);
        assert!(remote.refs.contains_key("refs/heads/master"));
    }
}
