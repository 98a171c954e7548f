// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{lines, PackFixture, Workspace};

use codo::{digest::sha256_hex, manifest::Entry, InstallOptions, ManifestStore};

use anyhow::Result;
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::fs;

fn fixture() -> PackFixture {
    PackFixture::new()
        .base("hooks/pre_tool_use.py", "print('hook')\n")
        .base("settings.json", "{}")
        .top("CLAUDE.md", "doc")
        .top("docs/guide.md", "guide")
}

#[test]
fn removal_backs_up_every_present_file() -> Result<()> {
    let ws = Workspace::new()?;
    ws.install(&fixture().resolve("v1", &[])?)?;
    ws.write("CLAUDE.md", "edited doc")?;
    fs::remove_file(ws.path("docs/guide.md"))?;
    let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();

    let removal = ws.remove(at, false)?;
    assert_eq!(removal.backup_dir, ws.ctx().backup_root().join("20250102-030405"));
    assert!(!removal.backup_dir.starts_with(ws.ctx().root()));

    let expect = vec![
        "- .claude/hooks/pre_tool_use.py",
        "- .claude/settings.json",
        "- CLAUDE.md",
    ];
    assert_eq!(lines(&removal.actions), expect);

    let backed_up = |relative: &str| fs::read_to_string(removal.backup_dir.join(relative));
    assert_eq!(backed_up(".claude/hooks/pre_tool_use.py")?, "print('hook')\n");
    assert_eq!(backed_up(".claude/settings.json")?, "{}");
    assert_eq!(backed_up("CLAUDE.md")?, "edited doc");
    assert!(!removal.backup_dir.join("docs/guide.md").exists());

    assert!(!ws.exists("CLAUDE.md"));
    assert!(!ws.exists(".claude/settings.json"));
    assert!(!ManifestStore::new(ws.ctx()).exists());

    Ok(())
}

#[test]
fn unmanaged_files_stay_but_sidecars_go() -> Result<()> {
    let ws = Workspace::new()?;
    ws.write("CLAUDE.md", "mine")?;
    ws.write("docs/guide.md", "my guide")?;
    let options = InstallOptions {
        leave_existing: true,
    };
    ws.install_with(&fixture().resolve("v1", &[])?, &options, false)?;
    ws.update(&fixture().top("docs/guide.md", "guide v2").resolve("v2", &[])?, false)?;
    assert!(ws.exists("CLAUDE.md.codo.new"));
    assert!(ws.exists("docs/guide.md.codo.new"));

    let removal = ws.remove(Utc::now(), false)?;
    let result = lines(&removal.actions);
    assert!(result.contains(&"~ skip unmanaged CLAUDE.md".to_string()));
    assert!(result.contains(&"~ skip unmanaged docs/guide.md".to_string()));

    assert_eq!(ws.read("CLAUDE.md")?, "mine");
    assert_eq!(ws.read("docs/guide.md")?, "my guide");
    assert!(!ws.exists("CLAUDE.md.codo.new"));
    assert!(!ws.exists("docs/guide.md.codo.new"));
    assert!(!removal.backup_dir.join("CLAUDE.md").exists());

    Ok(())
}

#[test]
fn dry_run_removal_moves_nothing() -> Result<()> {
    let ws = Workspace::new()?;
    ws.install(&fixture().resolve("v1", &[])?)?;

    let removal = ws.remove(Utc::now(), true)?;
    assert_eq!(removal.actions.len(), 4);
    assert!(!removal.backup_dir.exists());
    assert!(ws.exists("CLAUDE.md"));
    assert!(ManifestStore::new(ws.ctx()).exists());

    Ok(())
}

#[test]
fn back_to_back_removals_never_share_a_session() -> Result<()> {
    let ws = Workspace::new()?;
    let at = Utc.with_ymd_and_hms(2025, 6, 7, 8, 9, 10).unwrap();

    ws.install(&fixture().resolve("v1", &[])?)?;
    let first = ws.remove(at, false)?;
    ws.install(&fixture().resolve("v1", &[])?)?;
    let second = ws.remove(at, false)?;

    assert_ne!(first.backup_dir, second.backup_dir);
    assert_eq!(fs::read_to_string(first.backup_dir.join("CLAUDE.md"))?, "doc");
    assert_eq!(fs::read_to_string(second.backup_dir.join("CLAUDE.md"))?, "doc");

    Ok(())
}

#[test]
fn removal_never_touches_files_outside_the_repository() -> Result<()> {
    let ws = Workspace::new()?;
    ws.install(&fixture().resolve("v1", &[])?)?;
    let (escape, outside) = ws.sibling("not yours")?;

    let mut manifest = ws.manifest()?;
    manifest.files.insert(
        0,
        Entry {
            path: escape,
            sha256: sha256_hex("not yours"),
            unmanaged: false,
        },
    );
    ws.plant_legacy_manifest(&manifest)?;

    let removal = ws.remove(Utc::now(), false)?;
    let result = lines(&removal.actions);
    assert!(result.iter().all(|line| !line.contains("..")));
    assert_eq!(result.len(), 4);

    assert_eq!(fs::read_to_string(outside.path())?, "not yours");
    assert!(!ws.exists("outside.txt"));
    assert!(fs::read_dir(ws.ctx().backup_root())?
        .filter_map(|entry| entry.ok())
        .all(|entry| entry.path().is_dir()));

    Ok(())
}
