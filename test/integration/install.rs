// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{lines, PackFixture, Workspace};

use codo::{digest::sha256_hex, InstallOptions, ManifestStore};

use anyhow::Result;
use pretty_assertions::assert_eq;

fn fixture() -> PackFixture {
    PackFixture::new()
        .base("settings.json", "base settings")
        .base("commands/review.md", "review")
        .overlay("go", "settings.json", "go settings")
        .overlay("go", "commands/go-test.md", "go test")
        .overlay("python", "settings.json", "python settings")
        .top("CLAUDE.md", "top level doc")
}

#[test]
fn fresh_install_creates_everything() -> Result<()> {
    let ws = Workspace::new()?;
    let pack = fixture().resolve("v1.0", &["go"])?;

    let result = ws.install(&pack)?;
    let expect = vec![
        "+ .claude/commands/go-test.md",
        "+ .claude/commands/review.md",
        "+ .claude/settings.json",
        "+ CLAUDE.md",
    ];
    assert_eq!(result, expect);
    assert_eq!(ws.read(".claude/settings.json")?, "go settings");
    assert_eq!(ws.read("CLAUDE.md")?, "top level doc");

    let manifest = ws.manifest()?;
    assert_eq!(manifest.version, "v1.0");
    assert_eq!(manifest.overlays, vec!["go".to_string()]);
    assert_eq!(
        manifest.entry(".claude/settings.json").map(|entry| entry.sha256.clone()),
        Some(sha256_hex("go settings"))
    );
    assert!(!manifest.installed_at.is_empty());

    Ok(())
}

#[test]
fn second_install_is_identical_everywhere() -> Result<()> {
    let ws = Workspace::new()?;
    let pack = fixture().resolve("v1.0", &["go"])?;
    ws.install(&pack)?;
    let first = ws.manifest()?;

    let result = ws.install(&pack)?;
    assert!(result.iter().all(|line| line.starts_with("= ")));
    assert_eq!(result.len(), first.files.len());
    assert!(!ws.ctx().report_path().exists());
    assert_eq!(ws.manifest()?.files, first.files);

    Ok(())
}

#[test]
fn overlay_order_decides_content() -> Result<()> {
    let forward = Workspace::new()?;
    forward.install(&fixture().resolve("v1.0", &["go", "python"])?)?;
    assert_eq!(forward.read(".claude/settings.json")?, "python settings");

    let backward = Workspace::new()?;
    backward.install(&fixture().resolve("v1.0", &["python", "go"])?)?;
    assert_eq!(backward.read(".claude/settings.json")?, "go settings");

    Ok(())
}

#[test]
fn unknown_overlays_never_reach_the_manifest() -> Result<()> {
    let ws = Workspace::new()?;
    ws.install(&fixture().resolve("v1.0", &["../../etc", "python", "python"])?)?;

    assert_eq!(ws.manifest()?.overlays, vec!["python".to_string()]);
    assert_eq!(ws.read(".claude/settings.json")?, "python settings");

    Ok(())
}

#[test]
fn pre_existing_file_conflicts_without_being_touched() -> Result<()> {
    let ws = Workspace::new()?;
    ws.write("CLAUDE.md", "my own notes")?;
    ws.write(".claude/commands/review.md", "review")?;

    let result = ws.install(&fixture().resolve("v1.0", &[] as &[&str])?)?;
    let expect = vec![
        "= .claude/commands/review.md",
        "+ .claude/settings.json",
        "! conflict -> CLAUDE.md.codo.new",
    ];
    assert_eq!(result, expect);

    assert_eq!(ws.read("CLAUDE.md")?, "my own notes");
    assert_eq!(ws.read("CLAUDE.md.codo.new")?, "top level doc");
    assert_eq!(
        std::fs::read_to_string(ws.ctx().report_path())?,
        "CLAUDE.md.codo.new\n"
    );

    let manifest = ws.manifest()?;
    let entry = manifest.entry("CLAUDE.md").unwrap();
    assert_eq!(entry.sha256, sha256_hex("my own notes"));
    assert!(!entry.unmanaged);

    Ok(())
}

#[test]
fn dry_run_install_only_reports() -> Result<()> {
    let ws = Workspace::new()?;
    ws.write("CLAUDE.md", "my own notes")?;
    let pack = fixture().resolve("v1.0", &["go"])?;

    let outcome = ws.install_with(&pack, &InstallOptions::default(), true)?;
    assert_eq!(lines(&outcome.actions).len(), 4);
    assert_eq!(outcome.manifest, None);

    assert!(!ws.exists(".claude"));
    assert!(!ws.exists("CLAUDE.md.codo.new"));
    assert_eq!(ws.read("CLAUDE.md")?, "my own notes");
    assert!(!ManifestStore::new(ws.ctx()).exists());

    Ok(())
}
