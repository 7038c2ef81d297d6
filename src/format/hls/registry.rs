use super::packager::Packager;
use crate::error::{Result, UdpHlsError};
use log::debug;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Variant {
    name: String,
    label: Option<String>,
    playlist: String,
    packager: Arc<Packager>,
}

impl Variant {
    /// True when `file` is this variant's media playlist or one of its `<name>_<n>.ts` segments.
    fn owns_file(&self, file: &str) -> bool {
        if file == self.playlist {
            return true;
        }
        file.strip_prefix(self.name.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
            .and_then(|rest| rest.strip_suffix(".ts"))
            .map_or(false, |seq| !seq.is_empty() && seq.bytes().all(|b| b.is_ascii_digit()))
    }
}

/// Name to packager map consulted by the HTTP layer.
///
/// Entries are inserted at startup and only removed when their packager fails
/// to start. Readers never see a partially inserted entry since every change
/// happens under the write lock.
#[derive(Debug, Default)]
pub struct VariantRegistry {
    variants: RwLock<Vec<Variant>>,
}

fn is_boundary(c: char) -> bool {
    matches!(c, '/' | '_' | '.' | '-')
}

/// True when `token` occurs in `path` delimited by boundary characters or the path ends.
fn contains_token(path: &str, token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    path.match_indices(token).any(|(i, _)| {
        let before = path[..i].chars().next_back();
        let after = path[i + token.len()..].chars().next();
        before.map_or(true, is_boundary) && after.map_or(true, is_boundary)
    })
}

impl VariantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, packager: Arc<Packager>) -> Result<()> {
        let mut variants = self.variants.write();
        if variants.iter().any(|v| v.name == name) {
            return Err(UdpHlsError::DuplicateVariant(name.to_string()));
        }
        let label = packager.label();
        let playlist = packager.config().playlist_name();
        debug!("registered variant {} (alias {:?}, playlist {})", name, label, playlist);
        variants.push(Variant {
            name: name.to_string(),
            label,
            playlist,
            packager,
        });
        Ok(())
    }

    /// Drops `name` if it is still bound to `packager`.
    pub fn remove(&self, name: &str, packager: &Arc<Packager>) {
        let mut variants = self.variants.write();
        let before = variants.len();
        variants.retain(|v| !(v.name == name && Arc::ptr_eq(&v.packager, packager)));
        if variants.len() != before {
            debug!("removed variant {}", name);
        }
    }

    /// Packager registered under exactly `name`.
    pub fn get(&self, name: &str) -> Option<Arc<Packager>> {
        self.variants
            .read()
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.packager.clone())
    }

    /// Finds the packager a request path belongs to.
    ///
    /// A file name that is exactly a variant's playlist or segment name picks
    /// that variant. Otherwise the longest registered name found as a whole
    /// token wins, and resolution labels (`720p`) are only tried when no name
    /// matches.
    pub fn lookup(&self, path: &str) -> Option<Arc<Packager>> {
        let variants = self.variants.read();

        let file = path.rsplit('/').next().unwrap_or(path);
        if let Some(v) = variants.iter().find(|v| v.owns_file(file)) {
            return Some(v.packager.clone());
        }

        let by_name = variants
            .iter()
            .filter(|v| contains_token(path, &v.name))
            .fold(None::<&Variant>, |best, v| match best {
                Some(b) if b.name.len() >= v.name.len() => Some(b),
                _ => Some(v),
            });
        if let Some(v) = by_name {
            return Some(v.packager.clone());
        }

        variants
            .iter()
            .filter_map(|v| v.label.as_deref().map(|label| (label, v)))
            .filter(|(label, _)| contains_token(path, label))
            .fold(None::<(&str, &Variant)>, |best, (label, v)| match best {
                Some((b, bv)) if b.len() >= label.len() => Some((b, bv)),
                _ => Some((label, v)),
            })
            .map(|(_, v)| v.packager.clone())
    }

    pub fn len(&self) -> usize {
        self.variants.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.read().is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.variants.read().iter().map(|v| v.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::hls::PackagerConfig;

    fn packager(name: &str, resolution: &str) -> Arc<Packager> {
        Arc::new(Packager::new(
            PackagerConfig::new(name).with_variant(resolution, 100_000),
        ))
    }

    #[test]
    fn test_lookup_by_name() {
        let registry = VariantRegistry::new();
        let p1 = packager("480p", "854x480");
        let p2 = packager("720p", "1280x720");
        registry.register("480p", p1.clone()).unwrap();
        registry.register("720p", p2.clone()).unwrap();

        let found = registry.lookup("/stream_720p.m3u8").unwrap();
        assert!(Arc::ptr_eq(&found, &p2));
        let found = registry.lookup("/480p_12.ts").unwrap();
        assert!(Arc::ptr_eq(&found, &p1));
        assert!(registry.lookup("/stream_1080p.m3u8").is_none());
        assert!(registry.lookup("/x720p.m3u8").is_none());
    }

    #[test]
    fn test_alias_resolves_master_links() {
        let registry = VariantRegistry::new();
        let low = packager("low", "640x360");
        let high = packager("high", "1280x720");
        registry.register("low", low.clone()).unwrap();
        registry.register("high", high.clone()).unwrap();

        assert!(Arc::ptr_eq(&registry.lookup("/stream_360p.m3u8").unwrap(), &low));
        assert!(Arc::ptr_eq(&registry.lookup("/stream_720p.m3u8").unwrap(), &high));
        assert!(Arc::ptr_eq(&registry.lookup("/high_3.ts").unwrap(), &high));
    }

    #[test]
    fn test_longest_name_and_name_precedence() {
        let registry = VariantRegistry::new();
        let cam = packager("cam", "640x360");
        let cam_hd = packager("cam-hd", "1280x720");
        let named_360p = packager("360p", "1920x1080");
        registry.register("cam", cam.clone()).unwrap();
        registry.register("cam-hd", cam_hd.clone()).unwrap();
        registry.register("360p", named_360p.clone()).unwrap();

        assert!(Arc::ptr_eq(&registry.lookup("/cam-hd_4.ts").unwrap(), &cam_hd));
        assert!(Arc::ptr_eq(&registry.lookup("/cam_4.ts").unwrap(), &cam));
        // exact playlist name of "cam"
        assert!(Arc::ptr_eq(&registry.lookup("/stream_360p.m3u8").unwrap(), &cam));
        // "360p" is both a name and the alias of "cam"; outside exact files the name wins
        assert!(Arc::ptr_eq(&registry.lookup("/live/360p/index.m3u8").unwrap(), &named_360p));
        assert!(Arc::ptr_eq(&registry.lookup("/360p_2.ts").unwrap(), &named_360p));
    }

    #[test]
    fn test_exact_file_names_beat_name_tokens() {
        let registry = VariantRegistry::new();
        let stream = packager("stream", "640x360");
        let high = packager("high", "1280x720");
        registry.register("stream", stream.clone()).unwrap();
        registry.register("high", high.clone()).unwrap();

        // every master-manifest link contains the token "stream"
        assert!(Arc::ptr_eq(&registry.lookup("/stream_720p.m3u8").unwrap(), &high));
        assert!(Arc::ptr_eq(&registry.lookup("/stream_360p.m3u8").unwrap(), &stream));
        assert!(Arc::ptr_eq(&registry.lookup("/stream_3.ts").unwrap(), &stream));
        assert!(Arc::ptr_eq(&registry.lookup("/high_2.ts").unwrap(), &high));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = VariantRegistry::new();
        registry.register("cam", packager("cam", "640x360")).unwrap();
        let err = registry
            .register("cam", packager("cam", "1280x720"))
            .unwrap_err();
        assert!(matches!(err, UdpHlsError::DuplicateVariant(name) if name == "cam"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_only_drops_matching_packager() {
        let registry = VariantRegistry::new();
        let cam = packager("cam", "640x360");
        registry.register("cam", cam.clone()).unwrap();

        registry.remove("cam", &packager("cam", "640x360"));
        assert!(Arc::ptr_eq(&registry.get("cam").unwrap(), &cam));

        registry.remove("cam", &cam);
        assert!(registry.is_empty());
        assert!(registry.lookup("/cam_0.ts").is_none());
    }

    #[test]
    fn test_concurrent_reads_during_registration() {
        let registry = Arc::new(VariantRegistry::new());
        let writer = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    let name = format!("feed{}", i);
                    registry
                        .register(&name, packager(&name, "640x360"))
                        .unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let names = registry.names();
                        for name in &names {
                            let found = registry.lookup(&format!("/{}_0.ts", name)).unwrap();
                            assert_eq!(found.name(), name);
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(registry.len(), 200);
    }
}
