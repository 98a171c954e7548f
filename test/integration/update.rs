// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{PackFixture, Workspace};

use codo::{
    digest::sha256_hex,
    manifest::{Entry, ManifestError},
    reconcile::sidecar::ORPHAN_NOTE,
    InstallOptions, ManifestStore,
};

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::fs;

#[test]
fn unmodified_file_is_refreshed() -> Result<()> {
    let ws = Workspace::new()?;
    ws.install(&PackFixture::new().base("settings.json", "v1").resolve("v1", &[])?)?;

    let next = PackFixture::new().base("settings.json", "v2").resolve("v2", &[])?;
    let result = ws.update(&next, false)?;

    assert_eq!(result, vec!["~ .claude/settings.json"]);
    assert_eq!(ws.read(".claude/settings.json")?, "v2");

    let manifest = ws.manifest()?;
    assert_eq!(manifest.version, "v2");
    assert_eq!(manifest.files[0].sha256, sha256_hex("v2"));

    Ok(())
}

#[test]
fn local_edit_survives_update() -> Result<()> {
    let ws = Workspace::new()?;
    ws.install(&PackFixture::new().top("CLAUDE.md", "original").resolve("v1", &[])?)?;
    ws.write("CLAUDE.md", "local edit")?;

    let next = PackFixture::new().top("CLAUDE.md", "upstream edit").resolve("v2", &[])?;
    let result = ws.update(&next, false)?;

    assert_eq!(result, vec!["! conflict -> CLAUDE.md.codo.new"]);
    assert_eq!(ws.read("CLAUDE.md")?, "local edit");
    assert_eq!(ws.read("CLAUDE.md.codo.new")?, "upstream edit");
    assert_eq!(fs::read_to_string(ws.ctx().report_path())?, "CLAUDE.md.codo.new\n");
    assert_eq!(ws.manifest()?.files[0].sha256, sha256_hex("local edit"));

    Ok(())
}

#[test]
fn upstream_removal_prunes_only_untouched_files() -> Result<()> {
    let ws = Workspace::new()?;
    let first = PackFixture::new()
        .top("docs/edited.md", "edited")
        .top("docs/kept.md", "kept")
        .top("docs/old.md", "old")
        .resolve("v1", &[])?;
    ws.install(&first)?;
    ws.write("docs/edited.md", "mine now")?;

    let next = PackFixture::new().top("docs/kept.md", "kept").resolve("v2", &[])?;
    let result = ws.update(&next, false)?;

    let expect = vec![
        "! modified & removed upstream -> docs/edited.md.codo.removed.suggested",
        "~ docs/kept.md",
        "- docs/old.md",
    ];
    assert_eq!(result, expect);
    assert!(!ws.exists("docs/old.md"));
    assert_eq!(ws.read("docs/edited.md")?, "mine now");
    assert_eq!(ws.read("docs/edited.md.codo.removed.suggested")?, ORPHAN_NOTE);

    let manifest = ws.manifest()?;
    let paths: Vec<_> = manifest.paths().into_iter().collect();
    assert_eq!(paths, vec!["docs/kept.md"]);

    Ok(())
}

#[test]
fn new_and_deleted_files_are_created() -> Result<()> {
    let ws = Workspace::new()?;
    ws.install(&PackFixture::new().base("a.md", "a").resolve("v1", &[])?)?;
    fs::remove_file(ws.path(".claude/a.md"))?;

    let next = PackFixture::new()
        .base("a.md", "a2")
        .base("b.md", "b")
        .resolve("v2", &[])?;
    let result = ws.update(&next, false)?;

    assert_eq!(result, vec!["+ .claude/a.md", "+ .claude/b.md"]);
    assert_eq!(ws.read(".claude/a.md")?, "a2");
    assert_eq!(ws.read(".claude/b.md")?, "b");

    Ok(())
}

#[test]
fn update_keeps_overlays_of_previous_install() -> Result<()> {
    let ws = Workspace::new()?;
    let pack = PackFixture::new()
        .base("settings.json", "base")
        .overlay("go", "settings.json", "go v1");
    ws.install(&pack.resolve("v1", &["go"])?)?;

    let next = PackFixture::new()
        .base("settings.json", "base")
        .overlay("go", "settings.json", "go v2");
    let overlays = ws.manifest()?.overlays;
    let overlays: Vec<&str> = overlays.iter().map(String::as_str).collect();
    ws.update(&next.resolve("v2", &overlays)?, false)?;

    assert_eq!(ws.read(".claude/settings.json")?, "go v2");
    assert_eq!(ws.manifest()?.overlays, vec!["go".to_string()]);

    Ok(())
}

#[test]
fn unmanaged_file_is_never_overwritten() -> Result<()> {
    let ws = Workspace::new()?;
    ws.write("CLAUDE.md", "mine")?;
    let options = InstallOptions {
        leave_existing: true,
    };
    ws.install_with(
        &PackFixture::new().top("CLAUDE.md", "theirs").resolve("v1", &[])?,
        &options,
        false,
    )?;
    fs::remove_file(ws.path("CLAUDE.md.codo.new"))?;

    let next = PackFixture::new().top("CLAUDE.md", "theirs v2").resolve("v2", &[])?;
    let result = ws.update(&next, false)?;

    assert_eq!(result, vec!["! conflict -> CLAUDE.md.codo.new"]);
    assert_eq!(ws.read("CLAUDE.md")?, "mine");
    assert!(ws.manifest()?.files[0].unmanaged);

    Ok(())
}

#[test]
fn legacy_manifest_migrates_on_update() -> Result<()> {
    let ws = Workspace::new()?;
    ws.install(&PackFixture::new().base("a.md", "a").resolve("v1", &[])?)?;
    let ctx = ws.ctx();
    fs::rename(ctx.manifest_path(), ctx.legacy_manifest_path())?;
    assert!(ManifestStore::new(ctx).open()?.migration_pending());

    ws.update(&PackFixture::new().base("a.md", "a2").resolve("v2", &[])?, false)?;

    assert!(!ctx.legacy_manifest_path().exists());
    assert!(ctx.manifest_path().exists());
    assert!(!ManifestStore::new(ctx).open()?.migration_pending());

    Ok(())
}

#[test]
fn dry_run_update_changes_nothing() -> Result<()> {
    let ws = Workspace::new()?;
    ws.install(
        &PackFixture::new()
            .top("CLAUDE.md", "original")
            .top("docs/old.md", "old")
            .resolve("v1", &[])?,
    )?;
    ws.write("CLAUDE.md", "local edit")?;
    let before = fs::read(ws.ctx().manifest_path())?;

    let next = PackFixture::new().top("CLAUDE.md", "upstream").resolve("v2", &[])?;
    let result = ws.update(&next, true)?;

    assert_eq!(result, vec!["! conflict -> CLAUDE.md.codo.new", "- docs/old.md"]);
    assert_eq!(ws.read("CLAUDE.md")?, "local edit");
    assert!(!ws.exists("CLAUDE.md.codo.new"));
    assert!(ws.exists("docs/old.md"));
    assert!(!ws.ctx().report_path().exists());
    assert_eq!(fs::read(ws.ctx().manifest_path())?, before);

    Ok(())
}

#[test]
fn update_without_manifest_is_refused() -> Result<()> {
    let ws = Workspace::new()?;

    let err = ManifestStore::new(ws.ctx()).open().unwrap_err();
    assert!(matches!(err, ManifestError::NotInstalled));
    assert!(ws.update(&PackFixture::new().base("a.md", "a").resolve("v1", &[])?, false).is_err());
    assert!(!ws.exists(".claude"));

    Ok(())
}

#[test]
fn update_never_prunes_outside_the_repository() -> Result<()> {
    let ws = Workspace::new()?;
    ws.install(&PackFixture::new().base("a.md", "a").resolve("v1", &[])?)?;
    let (escape, outside) = ws.sibling("not yours")?;

    let mut manifest = ws.manifest()?;
    manifest.files.push(Entry {
        path: escape,
        sha256: sha256_hex("not yours"),
        unmanaged: false,
    });
    ws.plant_legacy_manifest(&manifest)?;

    let next = PackFixture::new().base("a.md", "a2").resolve("v2", &[])?;
    let result = ws.update(&next, false)?;

    assert_eq!(result, vec!["~ .claude/a.md"]);
    assert_eq!(fs::read_to_string(outside.path())?, "not yours");
    assert!(ws.manifest()?.files.iter().all(|entry| !entry.path.contains("..")));

    Ok(())
}
