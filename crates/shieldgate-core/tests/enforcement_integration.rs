//! Integration tests for enforcement across independent store handles.
//!
//! Each `Process` opens its own connections to the same files, the way the
//! foreground app and the host callbacks do. Nothing is shared between them
//! but the database files.

use chrono::{DateTime, Duration, Utc};
use shieldgate_core::host::files::ShieldFile;
use shieldgate_core::host::memory::{MemoryLauncher, MemoryScheduler, MemorySurface};
use shieldgate_core::storage::UnlockConfig;
use shieldgate_core::triggers::{button, interactive, threshold};
use shieldgate_core::{
    Actuation, EnforcementController, Event, RestrictionSelection, RestrictionTarget,
    SessionStore, SharedStore, TargetKind,
};
use tempfile::TempDir;

type Process = EnforcementController<MemorySurface, MemoryScheduler>;

fn target(name: &str) -> RestrictionTarget {
    RestrictionTarget::from_bytes(name.as_bytes())
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

fn spawn(dir: &TempDir) -> (Process, MemorySurface) {
    let surface = MemorySurface::new();
    let controller = EnforcementController::new(
        SharedStore::open(&dir.path().join("shared.db")).unwrap(),
        SessionStore::open(&dir.path().join("sessions.db")).unwrap(),
        &UnlockConfig::default(),
        surface.clone(),
        MemoryScheduler::new(),
    );
    (controller, surface)
}

fn apps(names: &[&str]) -> RestrictionSelection {
    names
        .iter()
        .fold(RestrictionSelection::new(), |sel, n| sel.with(TargetKind::App, target(n)))
}

#[test]
fn test_grant_and_expiry_scenario() {
    let dir = TempDir::new().unwrap();
    let (mut app, surface) = spawn(&dir);
    app.on_selection_changed(&apps(&["appA", "appB"]), at(0)).unwrap();

    app.grant_exemption(&target("appA"), 60, at(0)).unwrap();
    let active = app.active_exemptions(at(0)).unwrap();
    assert_eq!(active.into_iter().collect::<Vec<_>>(), vec![target("appA")]);
    assert_eq!(surface.last().unwrap().restricted(), Some(&apps(&["appB"])));

    app.apply_enforcement(at(901)).unwrap();
    assert_eq!(surface.last().unwrap().restricted(), Some(&apps(&["appA", "appB"])));
}

#[test]
fn test_expiry_converges_from_another_process() {
    let dir = TempDir::new().unwrap();
    let (mut foreground, _) = spawn(&dir);
    foreground.on_selection_changed(&apps(&["appA", "appB"]), at(0)).unwrap();
    foreground.grant_exemption(&target("appA"), 60, at(0)).unwrap();
    // The foreground process dies here with its relock timer armed.
    drop(foreground);

    let (mut callback, surface) = spawn(&dir);
    callback.apply_enforcement(at(300)).unwrap();
    assert_eq!(surface.last().unwrap().restricted(), Some(&apps(&["appB"])));

    threshold::on_reached(&mut callback, Some(&target("appA")), at(900)).unwrap();
    assert_eq!(surface.last().unwrap().restricted(), Some(&apps(&["appA", "appB"])));
}

#[test]
fn test_escalation_minute_59_and_61() {
    let dir = TempDir::new().unwrap();
    let (mut app, _) = spawn(&dir);
    app.on_selection_changed(&apps(&["appA"]), at(0)).unwrap();

    let minute = |m: i64| at(m * 60);
    app.grant_exemption(&target("appA"), 60, minute(0)).unwrap();
    app.grant_exemption(&target("appA"), 180, minute(1)).unwrap();
    app.grant_exemption(&target("appA"), 300, minute(40)).unwrap();

    let (other, _) = spawn(&dir);
    assert_eq!(other.required_duration(&target("appA"), minute(59)).unwrap(), 300);
    // Minutes 0 and 1 have left the window; only minute 40 remains.
    assert_eq!(other.required_duration(&target("appA"), minute(61)).unwrap(), 180);
    assert_eq!(other.required_duration(&target("appA"), minute(101)).unwrap(), 60);
}

#[test]
fn test_escalation_is_per_target() {
    let dir = TempDir::new().unwrap();
    let (mut app, _) = spawn(&dir);
    app.on_selection_changed(&apps(&["appA", "appB"]), at(0)).unwrap();
    app.grant_exemption(&target("appA"), 60, at(0)).unwrap();
    app.grant_exemption(&target("appA"), 180, at(100)).unwrap();

    assert_eq!(app.required_duration(&target("appA"), at(200)).unwrap(), 300);
    assert_eq!(app.required_duration(&target("appB"), at(200)).unwrap(), 60);
}

#[test]
fn test_button_and_interactive_in_separate_processes() {
    let dir = TempDir::new().unwrap();
    let (mut setup, _) = spawn(&dir);
    setup.on_selection_changed(&apps(&["appA"]), at(0)).unwrap();

    let overlay = SharedStore::open(&dir.path().join("shared.db")).unwrap();
    let mut launcher = MemoryLauncher::new();
    button::on_press(&overlay, &mut launcher, &target("appA"), "App A", at(5)).unwrap();

    let (mut foreground, surface) = spawn(&dir);
    let prompt = interactive::on_foreground(&foreground, at(6)).unwrap();
    let required = match prompt {
        Some(Event::UnlockPrompt { required_secs, hint, .. }) => {
            assert_eq!(hint, "App A");
            required_secs
        }
        other => panic!("expected a prompt, got {other:?}"),
    };
    assert_eq!(required, 60);

    let events =
        interactive::report_completed(&mut foreground, &target("appA"), required, at(70)).unwrap();
    assert!(matches!(events[0], Event::ExemptionGranted { .. }));
    assert_eq!(surface.last(), Some(Actuation::Clear));

    let (second, _) = spawn(&dir);
    assert!(interactive::on_foreground(&second, at(71)).unwrap().is_none());
}

#[test]
fn test_force_relock_is_seen_by_every_process() {
    let dir = TempDir::new().unwrap();
    let (mut app, _) = spawn(&dir);
    app.on_selection_changed(&apps(&["appA", "appB"]), at(0)).unwrap();
    app.grant_exemption(&target("appA"), 60, at(0)).unwrap();
    app.grant_exemption(&target("appB"), 60, at(30)).unwrap();

    let (mut admin, _) = spawn(&dir);
    admin.force_relock_all(at(60)).unwrap();

    let (mut callback, surface) = spawn(&dir);
    callback.apply_enforcement(at(61)).unwrap();
    assert_eq!(surface.last().unwrap().restricted(), Some(&apps(&["appA", "appB"])));

    // A fresh grant after the lock-down is honoured, at the escalated price.
    assert!(callback.grant_exemption(&target("appA"), 60, at(120)).is_err());
    callback.grant_exemption(&target("appA"), 180, at(120)).unwrap();
    assert_eq!(surface.last().unwrap().restricted(), Some(&apps(&["appB"])));
}

#[test]
fn test_dropped_target_is_unrestricted() {
    let dir = TempDir::new().unwrap();
    let (mut app, surface) = spawn(&dir);
    app.on_selection_changed(&apps(&["appA", "appB"]), at(0)).unwrap();
    app.on_selection_changed(&apps(&["appB"]), at(10)).unwrap();
    assert_eq!(surface.last().unwrap().restricted(), Some(&apps(&["appB"])));

    app.on_selection_changed(&RestrictionSelection::new(), at(20)).unwrap();
    assert_eq!(surface.last(), Some(Actuation::Clear));
}

#[test]
fn test_shield_file_tracks_enforcement() {
    let dir = TempDir::new().unwrap();
    let shield = ShieldFile::new(dir.path().join("shield.json"));
    let mut controller = EnforcementController::new(
        SharedStore::open(&dir.path().join("shared.db")).unwrap(),
        SessionStore::open(&dir.path().join("sessions.db")).unwrap(),
        &UnlockConfig::default(),
        shield.clone(),
        MemoryScheduler::new(),
    );
    controller.on_selection_changed(&apps(&["appA"]), at(0)).unwrap();
    assert_eq!(shield.read().unwrap().unwrap().restricted, apps(&["appA"]));

    controller.grant_exemption(&target("appA"), 60, at(10)).unwrap();
    assert!(shield.read().unwrap().is_none());

    let fired = controller.tick(at(10) + Duration::seconds(900)).unwrap();
    assert!(matches!(fired, Some(Event::EnforcementApplied { .. })));
    assert_eq!(shield.read().unwrap().unwrap().restricted, apps(&["appA"]));
}

#[test]
fn test_unchanged_rule_is_not_rewritten_by_a_new_process() {
    let dir = TempDir::new().unwrap();
    let shield = ShieldFile::new(dir.path().join("shield.json"));
    let open = || {
        EnforcementController::new(
            SharedStore::open(&dir.path().join("shared.db")).unwrap(),
            SessionStore::open(&dir.path().join("sessions.db")).unwrap(),
            &UnlockConfig::default(),
            shield.clone(),
            MemoryScheduler::new(),
        )
    };

    let mut first = open();
    first.on_selection_changed(&apps(&["appA"]), at(0)).unwrap();
    let applied_at = shield.read().unwrap().unwrap().applied_at;
    drop(first);

    let mut second = open();
    let event = second.apply_enforcement(at(10)).unwrap();
    assert!(matches!(event, Event::EnforcementUnchanged { .. }));
    assert_eq!(shield.read().unwrap().unwrap().applied_at, applied_at);

    // A damaged file is unknown state and gets rewritten.
    std::fs::write(shield.path(), "{truncated").unwrap();
    let mut third = open();
    let event = third.apply_enforcement(at(20)).unwrap();
    assert!(matches!(event, Event::EnforcementApplied { .. }));
    assert_eq!(shield.read().unwrap().unwrap().restricted, apps(&["appA"]));
}
