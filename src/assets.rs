//! Marker images (appearance icons and emojis), resolved from memory, then
//! local storage, then the packaged resources.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::imageops::{FilterType, resize};
use image::{ImageFormat, RgbaImage};
use tracing::{debug, trace, warn};

use crate::error::{OverlayError, Result};
use crate::face::{Appearance, Emoji, Gender, Glasses};

/// One tier of marker storage, addressed by file name.
pub trait AssetStore: Send + Sync {
    /// `Ok(None)` when this tier has no such file.
    fn load(&self, file_name: &str) -> Result<Option<RgbaImage>>;
}

/// Marker file name for any emoji name, e.g. `Tongue Wink` becomes
/// `tongue_wink_emoji.png`.
pub fn emoji_file_name(name: &str) -> String {
    format!("{}_emoji.png", name.trim().replace(' ', "_").to_lowercase())
}

pub fn appearance_file_name(gender: Gender, glasses: Glasses) -> String {
    let gender = match gender {
        Gender::Male => "male",
        Gender::Female => "female",
        Gender::Unknown => "unknown",
    };
    let glasses = match glasses {
        Glasses::Yes => "glasses",
        Glasses::No => "noglasses",
    };

    format!("{gender}_{glasses}.png")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKey {
    Appearance(Gender, Glasses),
    Emoji(Emoji),
}

impl From<Appearance> for MarkerKey {
    fn from(a: Appearance) -> MarkerKey {
        MarkerKey::Appearance(a.gender, a.glasses)
    }
}

impl From<Emoji> for MarkerKey {
    fn from(e: Emoji) -> MarkerKey {
        MarkerKey::Emoji(e)
    }
}

impl MarkerKey {
    /// `None` for markers that have no image at all.
    pub fn file_name(&self) -> Option<String> {
        match self {
            MarkerKey::Appearance(gender, glasses) => Some(appearance_file_name(*gender, *glasses)),
            MarkerKey::Emoji(Emoji::Unknown) => None,
            MarkerKey::Emoji(e) => Some(emoji_file_name(e.name())),
        }
    }
}

/// Decoded marker images for the lifetime of one view. Entries are never
/// invalidated; [`MarkerCache::teardown`] releases them all at once.
///
/// A marker that fails to resolve is remembered and not looked up again.
pub struct MarkerCache {
    storage: Arc<dyn AssetStore>,
    packaged: Arc<dyn AssetStore>,
    entries: HashMap<String, Arc<RgbaImage>>,
    missing: HashSet<String>,
}

impl MarkerCache {
    pub fn new(storage: Arc<dyn AssetStore>, packaged: Arc<dyn AssetStore>) -> Self {
        Self {
            storage,
            packaged,
            entries: HashMap::new(),
            missing: HashSet::new(),
        }
    }

    pub fn get(&mut self, file_name: &str) -> Result<Arc<RgbaImage>> {
        if let Some(img) = self.entries.get(file_name) {
            trace!("Marker cache hit for {file_name}");
            return Ok(Arc::clone(img));
        }
        if self.missing.contains(file_name) {
            return Err(OverlayError::AssetNotFound(file_name.to_string()));
        }

        let img = match self.resolve(file_name) {
            Ok(img) => Arc::new(img),
            Err(e) => {
                self.missing.insert(file_name.to_string());
                return Err(e);
            }
        };

        self.entries.insert(file_name.to_string(), Arc::clone(&img));
        Ok(img)
    }

    fn resolve(&self, file_name: &str) -> Result<RgbaImage> {
        match self.storage.load(file_name) {
            Ok(Some(img)) => Ok(img),
            Ok(None) => {
                debug!("Marker not found in storage: {file_name}");
                self.load_packaged(file_name)
            }
            Err(e) => {
                warn!("Unreadable marker in storage, trying packaged resources: {e}");
                self.load_packaged(file_name)
            }
        }
    }

    fn load_packaged(&self, file_name: &str) -> Result<RgbaImage> {
        self.packaged
            .load(file_name)?
            .ok_or_else(|| OverlayError::AssetNotFound(file_name.to_string()))
    }

    /// Resolves the image for a marker; `Ok(None)` when the marker has none
    /// or already failed to resolve, so a failure surfaces once.
    pub fn marker(&mut self, key: impl Into<MarkerKey>) -> Result<Option<Arc<RgbaImage>>> {
        match key.into().file_name() {
            Some(file_name) if self.missing.contains(&file_name) => {
                trace!("Skipping unresolvable marker {file_name}");
                Ok(None)
            }
            Some(file_name) => self.get(&file_name).map(Some),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Releases every cached image. Only safe once no render loop is using
    /// this cache.
    pub fn teardown(&mut self) {
        if !self.entries.is_empty() {
            debug!("Releasing {} marker images", self.entries.len());
        }
        self.entries.clear();
        self.entries.shrink_to_fit();
        self.missing.clear();
    }
}

impl Drop for MarkerCache {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Local storage: a directory of PNG files.
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.path(file_name).is_file()
    }

    pub fn remove(&self, file_name: &str) -> Result<bool> {
        let path = self.path(file_name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(OverlayError::Io { path, source }),
        }
    }

    pub fn save(&self, file_name: &str, img: &RgbaImage) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|source| OverlayError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path(file_name);
        img.save_with_format(&path, ImageFormat::Png)
            .map_err(|source| OverlayError::Encode { path, source })
    }
}

impl AssetStore for DirStore {
    fn load(&self, file_name: &str) -> Result<Option<RgbaImage>> {
        let path = self.path(file_name);
        if !path.is_file() {
            return Ok(None);
        }

        let img = image::open(&path).map_err(|source| OverlayError::AssetDecode {
            name: file_name.to_string(),
            source,
        })?;

        Ok(Some(img.into_rgba8()))
    }
}

/// Packaged resources: encoded images shipped with the application and
/// decoded on demand.
#[derive(Debug, Clone, Default)]
pub struct BundledStore {
    resources: HashMap<String, Cow<'static, [u8]>>,
}

impl BundledStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_name: impl Into<String>, bytes: impl Into<Cow<'static, [u8]>>) {
        self.resources.insert(file_name.into(), bytes.into());
    }

    /// Every `.png` in `dir`, keyed by file name.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let io_err = |source| OverlayError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut store = BundledStore::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("png") {
                continue;
            }

            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let bytes = std::fs::read(&path).map_err(|source| OverlayError::Io {
                path: path.clone(),
                source,
            })?;
            store.insert(file_name, bytes);
        }

        debug!("Loaded {} packaged markers from {dir:?}", store.resources.len());
        Ok(store)
    }
}

impl AssetStore for BundledStore {
    fn load(&self, file_name: &str) -> Result<Option<RgbaImage>> {
        let Some(bytes) = self.resources.get(file_name) else {
            return Ok(None);
        };

        let img = image::load_from_memory(bytes).map_err(|source| OverlayError::AssetDecode {
            name: file_name.to_string(),
            source,
        })?;

        Ok(Some(img.into_rgba8()))
    }
}

/// Copies a packaged marker into local storage, scaled for the display
/// density, unless storage already has it. Returns whether a file was written.
pub fn install_marker(
    storage: &DirStore,
    packaged: &dyn AssetStore,
    file_name: &str,
    density: f32,
) -> Result<bool> {
    if storage.contains(file_name) {
        return Ok(false);
    }

    let src = packaged
        .load(file_name)?
        .ok_or_else(|| OverlayError::AssetNotFound(file_name.to_string()))?;

    let width = ((src.width() as f32 * density).round() as u32).max(1);
    let height = ((src.height() as f32 * density).round() as u32).max(1);
    let scaled = if width == src.width() && height == src.height() {
        src
    } else {
        resize(&src, width, height, FilterType::Nearest)
    };

    storage.save(file_name, &scaled)?;
    debug!("Resized and saved marker {file_name} at {width}x{height}");

    Ok(true)
}

/// Installs every appearance and emoji marker the overlay can draw.
pub fn install_all_markers(storage: &DirStore, packaged: &dyn AssetStore, density: f32) -> Result<usize> {
    let appearance = [Gender::Male, Gender::Female, Gender::Unknown]
        .into_iter()
        .flat_map(|g| [Glasses::Yes, Glasses::No].map(|gl| MarkerKey::Appearance(g, gl)));
    let emojis = Emoji::SCORED.into_iter().map(MarkerKey::Emoji);

    let mut installed = 0;
    for key in appearance.chain(emojis) {
        if let Some(file_name) = key.file_name() {
            if install_marker(storage, packaged, &file_name, density)? {
                installed += 1;
            }
        }
    }

    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    struct Counting<S> {
        inner: S,
        loads: Arc<AtomicUsize>,
    }

    impl<S: AssetStore> AssetStore for Counting<S> {
        fn load(&self, file_name: &str) -> Result<Option<RgbaImage>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load(file_name)
        }
    }

    #[test]
    fn test_file_names() {
        assert_eq!(emoji_file_name(" Tongue Wink "), "tongue_wink_emoji.png");
        assert_eq!(
            MarkerKey::Emoji(Emoji::StuckOutTongueWinkingEye).file_name().unwrap(),
            "stuck_out_tongue_winking_eye_emoji.png"
        );
        assert_eq!(MarkerKey::Emoji(Emoji::Unknown).file_name(), None);
        assert_eq!(
            MarkerKey::Appearance(Gender::Female, Glasses::No).file_name().unwrap(),
            "female_noglasses.png"
        );
        assert_eq!(
            appearance_file_name(Gender::Unknown, Glasses::Yes),
            "unknown_glasses.png"
        );
    }

    #[test]
    fn test_packaged_fallback_then_memory() {
        let storage_loads = Arc::new(AtomicUsize::new(0));
        let packaged_loads = Arc::new(AtomicUsize::new(0));

        let mut bundled = BundledStore::new();
        bundled.insert("wink_emoji.png", png(4, 6));

        let mut cache = MarkerCache::new(
            Arc::new(Counting {
                inner: BundledStore::new(),
                loads: Arc::clone(&storage_loads),
            }),
            Arc::new(Counting {
                inner: bundled,
                loads: Arc::clone(&packaged_loads),
            }),
        );

        let first = cache.get("wink_emoji.png").unwrap();
        assert_eq!(first.dimensions(), (4, 6));
        assert_eq!(storage_loads.load(Ordering::SeqCst), 1);
        assert_eq!(packaged_loads.load(Ordering::SeqCst), 1);

        let second = cache.get("wink_emoji.png").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(storage_loads.load(Ordering::SeqCst), 1);
        assert_eq!(packaged_loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_storage_wins_over_packaged() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DirStore::new(dir.path());
        storage
            .save("male_glasses.png", &RgbaImage::new(8, 8))
            .unwrap();

        let mut bundled = BundledStore::new();
        bundled.insert("male_glasses.png", png(2, 2));

        let mut cache = MarkerCache::new(Arc::new(storage), Arc::new(bundled));
        let img = cache
            .marker(Appearance {
                gender: Gender::Male,
                glasses: Glasses::Yes,
            })
            .unwrap()
            .unwrap();
        assert_eq!(img.dimensions(), (8, 8));
    }

    #[test]
    fn test_missing_everywhere_is_not_found() {
        let packaged_loads = Arc::new(AtomicUsize::new(0));
        let mut cache = MarkerCache::new(
            Arc::new(BundledStore::new()),
            Arc::new(Counting {
                inner: BundledStore::new(),
                loads: Arc::clone(&packaged_loads),
            }),
        );

        assert!(matches!(
            cache.get("rage_emoji.png"),
            Err(OverlayError::AssetNotFound(name)) if name == "rage_emoji.png"
        ));
        assert!(cache.is_empty());
        assert_eq!(packaged_loads.load(Ordering::SeqCst), 1);

        // Not retried
        assert!(cache.get("rage_emoji.png").is_err());
        assert!(cache.marker(Emoji::Rage).unwrap().is_none());
        assert_eq!(packaged_loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_emoji_has_no_marker() {
        let mut cache = MarkerCache::new(Arc::new(BundledStore::new()), Arc::new(BundledStore::new()));
        assert!(cache.marker(Emoji::Unknown).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_storage_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scream_emoji.png"), b"not a png").unwrap();

        let mut bundled = BundledStore::new();
        bundled.insert("scream_emoji.png", png(3, 3));

        let mut cache = MarkerCache::new(Arc::new(DirStore::new(dir.path())), Arc::new(bundled));
        assert_eq!(cache.marker(Emoji::Scream).unwrap().unwrap().dimensions(), (3, 3));
    }

    #[test]
    fn test_teardown_releases_entries() {
        let mut bundled = BundledStore::new();
        bundled.insert("flushed_emoji.png", png(2, 2));
        let mut cache = MarkerCache::new(Arc::new(BundledStore::new()), Arc::new(bundled));

        let img = cache.marker(Emoji::Flushed).unwrap().unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(Arc::strong_count(&img), 2);

        cache.teardown();
        assert!(cache.is_empty());
        assert_eq!(Arc::strong_count(&img), 1);

        // Idempotent
        cache.teardown();
    }

    #[test]
    fn test_install_marker() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DirStore::new(dir.path().join("images"));
        let mut bundled = BundledStore::new();
        bundled.insert("smiley_emoji.png", png(10, 20));

        assert!(install_marker(&storage, &bundled, "smiley_emoji.png", 1.5).unwrap());
        let installed = storage.load("smiley_emoji.png").unwrap().unwrap();
        assert_eq!(installed.dimensions(), (15, 30));

        // Already present
        assert!(!install_marker(&storage, &bundled, "smiley_emoji.png", 1.5).unwrap());

        assert!(storage.remove("smiley_emoji.png").unwrap());
        assert!(!storage.remove("smiley_emoji.png").unwrap());
        assert!(matches!(
            install_marker(&storage, &bundled, "rage_emoji.png", 1.),
            Err(OverlayError::AssetNotFound(_))
        ));
    }
}
