//! End-to-end scan, extract and rescan over a fixture installation
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use trovekit_formats::compression::compress;
use trovekit_formats::hash::native_hash;
use trovekit_formats::varint;
use trovekit_storage::{
    CancelFlag, DiffEngine, DiffStatus, Extractor, ExtractorConfig, KnownHashes,
    previous_listing,
};

/// Write an index and one archive holding `files` back to back
///
/// Records carry the native hash, as the game's own indexes do.
fn write_category(dir: &Path, files: &[(&str, &[u8])]) {
    std::fs::create_dir_all(dir).expect("category dir");
    let mut index = Vec::new();
    let mut blob = Vec::new();
    for (name, content) in files {
        varint::encode_into(name.len() as u64, &mut index);
        index.extend_from_slice(name.as_bytes());
        let hash = u64::from(native_hash(content));
        for value in [0, blob.len() as u64, content.len() as u64, hash] {
            varint::encode_into(value, &mut index);
        }
        blob.extend_from_slice(content);
    }
    std::fs::write(dir.join("index.tfi"), index).expect("index");
    std::fs::write(dir.join("archive0.tfa"), compress(&blob)).expect("archive");
}

struct Install {
    _dir: TempDir,
    game: PathBuf,
    extracted: PathBuf,
}

fn install() -> Install {
    let dir = TempDir::new().expect("temp dir");
    let game = dir.path().join("Trove");
    let extracted = dir.path().join("extracted");
    write_category(
        &game.join("ui"),
        &[("hud.swf", &b"hud v1"[..]), ("menu.swf", &b"menu v1"[..])],
    );
    write_category(&game.join("textures/sky"), &[("sky.dds", &b"blue"[..])]);
    Install {
        _dir: dir,
        game,
        extracted,
    }
}

async fn run(install: &Install, known: &Arc<KnownHashes>) -> Vec<(String, DiffStatus)> {
    let engine = DiffEngine::new(&install.game, &install.extracted, ExtractorConfig::default());
    let previous = previous_listing(&install.extracted).await.expect("listing");
    let changes = engine
        .find_changes(known, &previous, &CancelFlag::new())
        .await
        .expect("find changes");

    let report = Extractor::new(&install.game, &install.extracted, Arc::clone(known))
        .extract_changes(&changes, &CancelFlag::new())
        .await
        .expect("extract");

    report
        .files
        .into_iter()
        .map(|f| (f.path, f.status.expect("status")))
        .collect()
}

#[tokio::test]
async fn test_incremental_extraction() {
    let install = install();
    let known = Arc::new(KnownHashes::load(install.extracted.join("hashes.json")).await);

    // First run extracts everything
    let first = run(&install, &known).await;
    assert_eq!(
        first,
        vec![
            ("textures/sky/sky.dds".to_string(), DiffStatus::Added),
            ("ui/hud.swf".to_string(), DiffStatus::Added),
            ("ui/menu.swf".to_string(), DiffStatus::Added),
        ]
    );
    assert_eq!(
        std::fs::read(install.extracted.join("ui/menu.swf")).expect("menu"),
        b"menu v1"
    );

    // Nothing changed: indexes are skipped by hash
    let known = Arc::new(KnownHashes::load(install.extracted.join("hashes.json")).await);
    assert_eq!(known.len(), 4);
    assert!(run(&install, &known).await.is_empty());

    // A game update rewrites one category
    write_category(
        &install.game.join("ui"),
        &[("hud.swf", &b"hud v2"[..]), ("menu.swf", &b"menu v1"[..])],
    );
    let third = run(&install, &known).await;
    assert_eq!(third, vec![("ui/hud.swf".to_string(), DiffStatus::Changed)]);
    assert_eq!(
        std::fs::read(install.extracted.join("ui/hud.swf")).expect("hud"),
        b"hud v2"
    );
}

#[tokio::test]
async fn test_removed_files_reported() {
    let install = install();
    let known = Arc::new(KnownHashes::new());
    run(&install, &known).await;

    write_category(&install.game.join("ui"), &[("hud.swf", &b"hud v1"[..])]);
    let engine = DiffEngine::new(&install.game, &install.extracted, ExtractorConfig::default());
    let previous = previous_listing(&install.extracted).await.expect("listing");
    let changes = engine
        .find_changes(&known, &previous, &CancelFlag::new())
        .await
        .expect("find changes");

    assert!(changes.changes.is_empty());
    assert_eq!(changes.removed, vec!["ui/menu.swf".to_string()]);
}
