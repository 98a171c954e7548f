// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{PackFixture, RepoFixture, Workspace};

use codo::{
    compute_drift, path::default_state_dir, Drift, DriftError, DriftKind, ManifestStore,
    RepositoryContext, StatusReport,
};

use anyhow::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::fs;

fn installed() -> Result<Workspace> {
    let ws = Workspace::new()?;
    ws.install(
        &PackFixture::new()
            .base("settings.json", "{}")
            .overlay("go", "commands/go-test.md", "go test")
            .top("CLAUDE.md", "doc")
            .resolve("v1.2.0", &["go"])?,
    )?;

    Ok(ws)
}

#[test]
fn one_edit_is_exactly_one_drift() -> Result<()> {
    let ws = installed()?;
    ws.write(".claude/settings.json", r#"{"model": "mine"}"#)?;

    let result = compute_drift(ws.ctx(), &ws.manifest()?);
    let expect = vec![Drift {
        path: ".claude/settings.json".into(),
        kind: DriftKind::Modified,
    }];
    assert_eq!(result, expect);

    Ok(())
}

#[test]
fn status_report_lists_drift() -> Result<()> {
    let ws = installed()?;
    ws.write(".claude/settings.json", "{ }")?;
    fs::remove_file(ws.path("CLAUDE.md"))?;

    let opened = ManifestStore::new(ws.ctx()).open()?;
    let report = StatusReport::new(ws.ctx(), &opened);
    let expect = indoc! {"
        Installed version: v1.2.0
        Overlays: go
        Drift:
          ~ .claude/settings.json
          missing CLAUDE.md
    "};
    assert_eq!(report.to_string(), expect);
    assert!(!report.is_clean());

    Ok(())
}

#[test]
fn clean_install_reports_no_drift() -> Result<()> {
    let ws = installed()?;
    let ctx = ws.ctx();
    fs::rename(ctx.manifest_path(), ctx.legacy_manifest_path())?;

    let opened = ManifestStore::new(ctx).open()?;
    let report = StatusReport::new(ctx, &opened);
    let expect = indoc! {"
        Installed version: v1.2.0
        Overlays: go
        Manifest: legacy location, migrates on next write
        No drift
    "};
    assert_eq!(report.to_string(), expect);
    assert!(report.is_clean());

    Ok(())
}

#[test]
fn strict_status_fails_only_on_drift() -> Result<()> {
    let ws = installed()?;
    let report = StatusReport::new(ws.ctx(), &ManifestStore::new(ws.ctx()).open()?);
    assert_eq!(report.strict(), Ok(()));

    ws.write("CLAUDE.md", "edited doc")?;
    let report = StatusReport::new(ws.ctx(), &ManifestStore::new(ws.ctx()).open()?);
    let err = report.strict().unwrap_err();
    assert_eq!(err, DriftError::Detected { count: 1 });
    assert_eq!(err.to_string(), "drift detected in 1 managed file(s)");

    Ok(())
}

#[sealed_test(env = [("CODO_STATE_DIR", "/tmp/codo-sealed-state")])]
fn context_discovers_enclosing_work_tree() -> Result<()> {
    let project = std::env::current_dir()?.join("project");
    fs::create_dir_all(project.join("nested/deep"))?;
    let repo = RepoFixture::new(&project)?;
    repo.stage_and_commit("README.md", "hello")?;

    let ctx = RepositoryContext::discover(project.join("nested/deep"), default_state_dir()?)?;
    assert_eq!(fs::canonicalize(ctx.root())?, fs::canonicalize(&project)?);
    assert_eq!(ctx.state_dir(), std::path::Path::new("/tmp/codo-sealed-state"));

    let plain = std::env::current_dir()?.join("plain");
    fs::create_dir_all(&plain)?;
    let ctx = RepositoryContext::discover(&plain, default_state_dir()?)?;
    assert_eq!(ctx.root(), plain.as_path());

    Ok(())
}
