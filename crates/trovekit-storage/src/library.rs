//! Mod directory loader
//!
//! The game reads `*.tmod` and `*.zip` mods from a single directory. A mod
//! is disabled by appending `.disabled` to its file name. Loading never
//! fails because of one bad mod: unreadable files are logged, listed in
//! [`ModLibrary::failures`] and left out.
//!
//! Interface mods can also be given a config file in the game's `ModCfgs`
//! directory, with one `[movie.swf]` section per embedded movie.

use crate::atomic::write_atomic;
use crate::config::LibraryOptions;
use crate::{Result, StorageError};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};
use trovekit_formats::tmod::{self, ContainerFormat, ModContainer};
use trovekit_formats::zmod;

const DISABLED_SUFFIX: &str = ".disabled";
const ZIP_MAGIC: [&[u8; 4]; 2] = [b"PK\x03\x04", b"PK\x05\x06"];

/// Format and enabled state from a file name
fn classify(file_name: &str) -> Option<(ContainerFormat, bool)> {
    let (base, enabled) = file_name
        .strip_suffix(DISABLED_SUFFIX)
        .map_or((file_name, true), |base| (base, false));

    [ContainerFormat::TMod, ContainerFormat::ZMod]
        .into_iter()
        .find(|format| {
            base.strip_suffix(format.extension())
                .is_some_and(|stem| stem.ends_with('.') && stem.len() > 1)
        })
        .map(|format| (format, enabled))
}

/// File name for a mod called `stem`
fn mod_file_name(stem: &str, format: ContainerFormat, enabled: bool) -> String {
    let suffix = if enabled { "" } else { DISABLED_SUFFIX };
    format!("{stem}.{}{suffix}", format.extension())
}

/// Stem of a mod file name, without format and disabled suffixes
fn mod_stem(file_name: &str, format: ContainerFormat) -> &str {
    let base = file_name.strip_suffix(DISABLED_SUFFIX).unwrap_or(file_name);
    base.strip_suffix(format.extension())
        .and_then(|s| s.strip_suffix('.'))
        .unwrap_or(base)
}

async fn starts_with_zip_magic(path: &Path) -> Result<bool> {
    let mut file = fs::File::open(path).await?;
    let mut magic = [0u8; 4];
    let mut filled = 0;
    while filled < magic.len() {
        let read = file.read(&mut magic[filled..]).await?;
        if read == 0 {
            return Ok(false);
        }
        filled += read;
    }
    Ok(ZIP_MAGIC.iter().any(|m| **m == magic))
}

/// Movie names of every `[name.swf]` section header in a mod config
fn config_sections(text: &str) -> BTreeSet<&str> {
    text.lines()
        .filter_map(|line| line.strip_prefix('[')?.strip_suffix(']'))
        .filter(|name| name.ends_with(".swf"))
        .collect()
}

/// Read just the header of a TMod: the size field, then that many bytes
async fn read_tmod_header(path: &Path) -> Result<Vec<u8>> {
    let mut file = fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    let mut size_field = [0u8; 8];
    if file.read_exact(&mut size_field).await.is_err() {
        // Too short for a header; let the parser report it
        return Ok(fs::read(path).await?);
    }

    let header_size = u64::from_le_bytes(size_field).min(len);
    let mut data = size_field.to_vec();
    data.resize(usize::try_from(header_size).unwrap_or(usize::MAX).max(8), 0);
    file.read_exact(&mut data[8..]).await?;
    Ok(data)
}

/// A mod file found in the library
#[derive(Debug)]
pub struct ModEntry {
    container: ModContainer,
    path: PathBuf,
    enabled: bool,
}

impl ModEntry {
    /// Parsed container
    pub fn container(&self) -> &ModContainer {
        &self.container
    }

    /// Current file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the game loads this mod
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Container format
    pub fn format(&self) -> ContainerFormat {
        self.container.format
    }

    /// Title, or an empty string for untitled mods
    pub fn name(&self) -> &str {
        self.container.name().unwrap_or_default()
    }

    fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    fn set_path(&mut self, path: PathBuf) {
        self.container.source_path = Some(path.clone());
        self.path = path;
    }

    /// Title, when it can be used as a file name
    fn file_title(&self) -> Option<&str> {
        let title = self.container.name()?;
        let unusable = title.is_empty()
            || title.contains(['/', '\\'])
            || title == "."
            || title == "..";
        (!unusable).then_some(title)
    }

    /// File name a TMod should have given its title and enabled state
    ///
    /// `None` for zips, untitled mods and titles that are not usable as a
    /// file name.
    pub fn expected_file_name(&self) -> Option<String> {
        if self.format() != ContainerFormat::TMod {
            return None;
        }
        let title = self.file_title()?;
        Some(mod_file_name(title, ContainerFormat::TMod, self.enabled))
    }

    /// Whether a TMod's file name differs from its title
    pub fn has_wrong_name(&self) -> bool {
        self.expected_file_name()
            .is_some_and(|expected| expected != self.file_name())
    }

    /// Rename a TMod after its title
    ///
    /// Returns `false` when nothing was renamed: the name is already right,
    /// or another file holds the target name.
    pub async fn fix_name(&mut self) -> Result<bool> {
        let Some(expected) = self.expected_file_name() else {
            return Ok(false);
        };
        if expected == self.file_name() {
            return Ok(false);
        }

        let target = self.path.with_file_name(&expected);
        if fs::try_exists(&target).await? {
            debug!("Not renaming {}: {} exists", self.path.display(), expected);
            return Ok(false);
        }
        fs::rename(&self.path, &target).await?;
        info!("Renamed {} to {}", self.path.display(), expected);
        self.set_path(target);
        Ok(true)
    }

    /// File names of the embedded `.swf` movies, in container order
    fn movie_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for path in self.container.content_files() {
            if !path.ends_with(".swf") {
                continue;
            }
            let name = path.rsplit('/').next().unwrap_or(path);
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Create or extend `<title>.cfg` in `configs_dir`
    ///
    /// A new file gets one `[name.swf]` section per embedded movie. An
    /// existing file keeps its content and only has missing sections
    /// appended. Returns whether the file was written.
    pub async fn ensure_config(&self, configs_dir: &Path) -> Result<bool> {
        let movies = self.movie_names();
        let Some(title) = self.file_title() else {
            return Ok(false);
        };
        if movies.is_empty() {
            return Ok(false);
        }

        let path = configs_dir.join(format!("{title}.cfg"));
        let contents = match fs::read_to_string(&path).await {
            Ok(current) => {
                let present = config_sections(&current);
                let missing: Vec<String> = movies
                    .iter()
                    .filter(|movie| !present.contains(**movie))
                    .map(|movie| format!("[{movie}]"))
                    .collect();
                if missing.is_empty() {
                    return Ok(false);
                }
                format!("{current}\n\n{}", missing.join("\n\n"))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => movies
                .iter()
                .map(|movie| format!("[{movie}]"))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => return Err(e.into()),
        };

        write_atomic(&path, contents.as_bytes()).await?;
        debug!("Updated mod config {}", path.display());
        Ok(true)
    }

    /// Enable a disabled mod or disable an enabled one
    ///
    /// Fails with [`StorageError::AlreadyExists`] when the target name is taken.
    pub async fn toggle(&mut self) -> Result<()> {
        let format = self.format();
        let stem = mod_stem(self.file_name(), format).to_string();
        let target = self
            .path
            .with_file_name(mod_file_name(&stem, format, !self.enabled));

        if fs::try_exists(&target).await? {
            return Err(StorageError::AlreadyExists(target));
        }
        fs::rename(&self.path, &target).await?;
        debug!(
            "{} {}",
            if self.enabled { "Disabled" } else { "Enabled" },
            stem
        );
        self.enabled = !self.enabled;
        self.set_path(target);
        Ok(())
    }
}

/// What two mods conflict over
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    /// Both have the same title
    Name,
    /// Both replace these game files
    Files(Vec<String>),
}

/// A conflict between two mods of a library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// What the mods conflict over
    pub kind: ConflictKind,
    /// Path of one mod
    pub first: PathBuf,
    /// Path of the other
    pub second: PathBuf,
}

impl Conflict {
    /// Whether `path` is one of the two mods
    pub fn involves(&self, path: &Path) -> bool {
        self.first == path || self.second == path
    }
}

/// Every mod in a mods directory
#[derive(Debug, Default)]
pub struct ModLibrary {
    directory: PathBuf,
    mods: Vec<ModEntry>,
    failures: Vec<(PathBuf, String)>,
}

impl ModLibrary {
    /// Load every mod under `directory`
    pub async fn load(directory: impl Into<PathBuf>, options: LibraryOptions) -> Result<Self> {
        let directory = directory.into();
        if options.fix_extensions {
            fix_extensions(&directory).await?;
        }

        let mut library = Self {
            directory,
            ..Self::default()
        };

        for (path, format, enabled) in list_mod_files(&library.directory).await? {
            match load_mod(&path, format, options.partial).await {
                Ok(container) => {
                    let mut entry = ModEntry {
                        container,
                        path,
                        enabled,
                    };
                    if options.fix_names && entry.has_wrong_name() {
                        if let Err(e) = entry.fix_name().await {
                            warn!("Failed to rename {}: {}", entry.path.display(), e);
                        }
                    }
                    library.mods.push(entry);
                }
                Err(e @ StorageError::Join(_)) => return Err(e),
                Err(e) => {
                    warn!("Skipping mod {}: {}", path.display(), e);
                    library.failures.push((path, e.to_string()));
                }
            }
        }

        library
            .mods
            .sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.path.cmp(&b.path)));

        if let Some(configs_dir) = &options.configs_dir {
            for entry in library.mods.iter().filter(|m| m.container.is_ui_mod()) {
                if let Err(e) = entry.ensure_config(configs_dir).await {
                    warn!("Failed to update config for {}: {}", entry.name(), e);
                }
            }
        }
        info!(
            "Loaded {} mods from {} ({} failed)",
            library.mods.len(),
            library.directory.display(),
            library.failures.len()
        );
        Ok(library)
    }

    /// Mods directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Every loaded mod, sorted by name
    pub fn mods(&self) -> &[ModEntry] {
        &self.mods
    }

    /// Mutable access, for toggling and renaming
    pub fn mods_mut(&mut self) -> &mut [ModEntry] {
        &mut self.mods
    }

    /// Files that could not be loaded, with the reason
    pub fn failures(&self) -> &[(PathBuf, String)] {
        &self.failures
    }

    /// Enabled mods
    pub fn enabled(&self) -> impl Iterator<Item = &ModEntry> {
        self.mods.iter().filter(|m| m.enabled)
    }

    /// Disabled mods
    pub fn disabled(&self) -> impl Iterator<Item = &ModEntry> {
        self.mods.iter().filter(|m| !m.enabled)
    }

    /// Every pair of mods sharing a title or a content file
    ///
    /// Each pair is reported once per kind, in library order.
    pub fn conflicts(&self) -> Vec<Conflict> {
        let file_sets: Vec<BTreeSet<&str>> = self
            .mods
            .iter()
            .map(|m| m.container.content_files().into_iter().collect())
            .collect();

        let mut conflicts = Vec::new();
        for (i, first) in self.mods.iter().enumerate() {
            for (j, second) in self.mods.iter().enumerate().skip(i + 1) {
                if !first.name().is_empty() && first.name() == second.name() {
                    conflicts.push(Conflict {
                        kind: ConflictKind::Name,
                        first: first.path.clone(),
                        second: second.path.clone(),
                    });
                }

                let shared: Vec<String> = file_sets[i]
                    .intersection(&file_sets[j])
                    .map(|path| (*path).to_string())
                    .collect();
                if !shared.is_empty() {
                    conflicts.push(Conflict {
                        kind: ConflictKind::Files(shared),
                        first: first.path.clone(),
                        second: second.path.clone(),
                    });
                }
            }
        }
        conflicts
    }
}

/// Mod files in `directory`, sorted by path
async fn list_mod_files(directory: &Path) -> Result<Vec<(PathBuf, ContainerFormat, bool)>> {
    let mut found = Vec::new();
    let mut entries = fs::read_dir(directory).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some((format, enabled)) = name.to_str().and_then(classify) else {
            continue;
        };
        found.push((entry.path(), format, enabled));
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

/// Rename TMods that are really zips, and zips that are not
async fn fix_extensions(directory: &Path) -> Result<()> {
    for (path, format, enabled) in list_mod_files(directory).await? {
        let is_zip = match starts_with_zip_magic(&path).await {
            Ok(is_zip) => is_zip,
            Err(e) => {
                warn!("Cannot inspect {}: {}", path.display(), e);
                continue;
            }
        };
        let actual = if is_zip {
            ContainerFormat::ZMod
        } else {
            ContainerFormat::TMod
        };
        if actual == format {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let target = path.with_file_name(mod_file_name(mod_stem(file_name, format), actual, enabled));
        if fs::try_exists(&target).await? {
            warn!(
                "Not renaming {}: {} exists",
                path.display(),
                target.display()
            );
            continue;
        }
        info!("Renaming {} to {}", path.display(), target.display());
        fs::rename(&path, &target).await?;
    }
    Ok(())
}

async fn load_mod(path: &Path, format: ContainerFormat, partial: bool) -> Result<ModContainer> {
    let data = if partial && format == ContainerFormat::TMod {
        read_tmod_header(path).await?
    } else {
        fs::read(path).await?
    };

    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || match format {
        ContainerFormat::TMod => tmod::parse(&owned, &data, partial),
        ContainerFormat::ZMod => zmod::parse_zip(&owned, &data),
    })
    .await?
    .map_err(|source| StorageError::Container {
        path: path.to_path_buf(),
        source,
    })
}
