use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use fnv::FnvHashMap;
use log::warn;

use crate::stage::CompileSettings;

/// Compiled module words, shared between the cache and its callers.
pub type SpirvBlob = Arc<Vec<u32>>;

/// The external compiler front end. Implementations invoke a full textual
/// compiler; the cache only calls this on a key miss.
pub trait ShaderCompiler {
    /// Returns the compiled words, or the compiler's error text.
    fn compile(&self, settings: CompileSettings, source: &str) -> Result<Vec<u32>, String>;
}

const CACHE_MAGIC: u32 = 0x5350_4143;
const CACHE_VERSION: u32 = 1;

// Error text can be arbitrarily long; logs get a bounded prefix.
const LOG_TRUNCATE: usize = 1024;

/// Content-addressed store of compiled shader blobs.
///
/// Keys by a rolling hash of the source folded with a stage/language
/// discriminator. A hit returns the stored blob unconditionally, with no
/// re-validation against the source text; key stability within a session is
/// the caller's contract. Persists to a single versioned file; any mismatch
/// or corruption on load degrades to an empty cache and a cold start.
#[derive(Debug)]
pub struct ShaderCache {
    path: Option<PathBuf>,
    entries: FnvHashMap<u32, SpirvBlob>,
    dirty: bool,
    caching: bool,
}

impl ShaderCache {
    /// Opens the cache file, or starts cold if it is absent, stale or
    /// corrupt. Never fails.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match load_cache_file(&path) {
            Ok(entries) => Some(entries),
            Err(err) => {
                warn!("shader cache {:?} not loaded: {}", path, err);
                None
            }
        };
        // A failed load marks the cache dirty so a fresh file gets written
        // at shutdown.
        let dirty = entries.is_none();
        ShaderCache {
            path: Some(path),
            entries: entries.unwrap_or_default(),
            dirty,
            caching: false,
        }
    }

    /// A cache with no backing file; entries live for the session only.
    pub fn in_memory() -> Self {
        ShaderCache {
            path: None,
            entries: Default::default(),
            dirty: false,
            caching: false,
        }
    }

    /// Scopes whether successful compiles are inserted. Bulk provisioning
    /// turns this on around the whole batch.
    pub fn set_caching(&mut self, enable: bool) {
        self.caching = enable;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the cached blob for the key, or invokes the compiler.
    ///
    /// Compile failure returns the compiler's error text and caches nothing.
    pub fn get_or_compile(
        &mut self,
        compiler: &dyn ShaderCompiler,
        settings: CompileSettings,
        source: &str,
    ) -> Result<SpirvBlob, String> {
        assert!(!source.is_empty());

        let hash = blob_hash(settings, source);
        if let Some(blob) = self.entries.get(&hash) {
            return Ok(Arc::clone(blob));
        }

        match compiler.compile(settings, source) {
            Ok(words) => {
                let blob = Arc::new(words);
                if self.caching {
                    self.entries.insert(hash, Arc::clone(&blob));
                    self.dirty = true;
                }
                Ok(blob)
            }
            Err(errors) => {
                let mut logged = errors.as_str();
                if logged.len() > LOG_TRUNCATE {
                    logged = &logged[..LOG_TRUNCATE];
                }
                warn!("shader compile error:\n{}", logged);
                Err(errors)
            }
        }
    }

    /// Writes the cache file if anything changed since load.
    pub fn save(&mut self) {
        if !self.dirty {
            return;
        }
        let Some(path) = &self.path else { return };
        match save_cache_file(path, &self.entries) {
            Ok(()) => self.dirty = false,
            Err(err) => warn!("failed to write shader cache {:?}: {}", path, err),
        }
    }
}

impl Drop for ShaderCache {
    fn drop(&mut self) {
        // Clean shutdown persists new entries; otherwise the in-memory blobs
        // are simply released without touching the file.
        self.save();
    }
}

// djb2-style rolling hash, seedable so the discriminator folds into the
// source hash.
fn strhash(bytes: &[u8], seed: u32) -> u32 {
    let mut hash = seed;
    for &b in bytes {
        hash = hash.wrapping_shl(5).wrapping_add(hash).wrapping_add(b as u32);
    }
    hash
}

/// Cache key: source hash folded with a 2-byte (stage, language)
/// discriminator, so identical source compiled for two stages or languages
/// keys separately.
pub(crate) fn blob_hash(settings: CompileSettings, source: &str) -> u32 {
    let hash = strhash(source.as_bytes(), 5381);
    let discriminator = [
        b'a' + settings.stage.index() as u8,
        b'a' + settings.lang as u8,
    ];
    strhash(&discriminator, hash)
}

fn load_cache_file(path: &std::path::Path) -> io::Result<FnvHashMap<u32, SpirvBlob>> {
    let mut file = BufReader::new(File::open(path)?);

    let bad = |what: &str| io::Error::new(io::ErrorKind::InvalidData, what.to_owned());
    if file.read_u32::<LittleEndian>()? != CACHE_MAGIC {
        return Err(bad("magic number mismatch"));
    }
    if file.read_u32::<LittleEndian>()? != CACHE_VERSION {
        return Err(bad("version mismatch"));
    }

    let count = file.read_u32::<LittleEndian>()?;
    let mut entries = FnvHashMap::default();
    for _ in 0..count {
        let hash = file.read_u32::<LittleEndian>()?;
        let len = file.read_u32::<LittleEndian>()? as usize;
        let mut words = vec![0u32; len];
        file.read_u32_into::<LittleEndian>(&mut words)?;
        entries.insert(hash, Arc::new(words));
    }
    Ok(entries)
}

fn save_cache_file(
    path: &std::path::Path,
    entries: &FnvHashMap<u32, SpirvBlob>,
) -> io::Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    file.write_u32::<LittleEndian>(CACHE_MAGIC)?;
    file.write_u32::<LittleEndian>(CACHE_VERSION)?;
    file.write_u32::<LittleEndian>(entries.len() as u32)?;
    for (&hash, blob) in entries {
        file.write_u32::<LittleEndian>(hash)?;
        file.write_u32::<LittleEndian>(blob.len() as u32)?;
        for &word in blob.iter() {
            file.write_u32::<LittleEndian>(word)?;
        }
    }
    Ok(())
}
