//! Cross-grammar reconciliation properties
//!
//! - a report right after fix + commit is compliant, for every grammar
//! - undoing a committed rewrite restores the original bytes

use std::sync::Arc;

use confix_content::{
    DesiredEntry, DesiredStateSpec, GrammarAdapter, GrammarKind, Intent, MemoryPreferenceStore,
    MemoryProfileStore, PreferenceHandler, ProfileHandler,
};
use confix_core::{
    ChangeLog, Compliance, EngineSettings, EventId, KvEditor, LogContext, Session, Staged,
};
use confix_test_utils::{TestTarget, fixtures};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;

const RULE: u32 = 90;

fn text_spec(kind: GrammarKind) -> DesiredStateSpec {
    match kind {
        GrammarKind::OpenEq => DesiredStateSpec::new()
            .with("rotate", 12)
            .with("compress", "yes"),
        GrammarKind::ClosedEq => DesiredStateSpec::new()
            .with("kernel.randomize_va_space", 2)
            .with("fs.suid_dumpable", 0),
        GrammarKind::Space => DesiredStateSpec::new()
            .with("PermitRootLogin", "no")
            .with("ClientAliveCountMax", 0),
        GrammarKind::TaggedBlock => DesiredStateSpec::new()
            .with_entry(DesiredEntry::tagged("DEFAULT", "bantime", 3600))
            .with_entry(DesiredEntry::tagged("sshd", "enabled", true))
            .with_entry(DesiredEntry::tagged("recidive", "enabled", true)),
        GrammarKind::HostPrefStore | GrammarKind::HostProfileList => DesiredStateSpec::new(),
    }
}

fn fixture(kind: GrammarKind) -> &'static str {
    match kind {
        GrammarKind::OpenEq => fixtures::LOGROTATE_CONF,
        GrammarKind::ClosedEq => fixtures::SYSCTL_CONF,
        GrammarKind::Space => fixtures::SSHD_CONFIG,
        GrammarKind::TaggedBlock => fixtures::JAIL_CONF,
        GrammarKind::HostPrefStore | GrammarKind::HostProfileList => "",
    }
}

/// Adapter and desired state for `kind`, backed by fresh in-memory stores.
fn adapter_and_spec(kind: GrammarKind) -> (Box<dyn GrammarAdapter>, DesiredStateSpec) {
    match kind {
        GrammarKind::HostPrefStore => {
            let store = MemoryPreferenceStore::new()
                .with("com.apple.screensaver", "idleTime", 1200)
                .with("com.apple.screensaver", "moduleName", "Flurry");
            let spec = DesiredStateSpec::new()
                .with_entry(DesiredEntry::tagged("com.apple.screensaver", "idleTime", 600))
                .with_entry(DesiredEntry::tagged("com.apple.screensaver", "askForPassword", 1));
            (Box::new(PreferenceHandler::new(Arc::new(store))), spec)
        }
        GrammarKind::HostProfileList => {
            let store = MemoryProfileStore::new()
                .with_profile("com.example.wifi", json!({"SSID": "corp"}));
            let spec = DesiredStateSpec::new()
                .with("com.example.firewall", json!({"EnableFirewall": true}))
                .with("com.example.wifi", json!({"SSID": "corp", "AutoJoin": true}));
            (Box::new(ProfileHandler::new(Arc::new(store))), spec)
        }
        text => (
            confix_content::text_adapter(text).unwrap(),
            text_spec(text),
        ),
    }
}

#[rstest]
#[case(GrammarKind::OpenEq)]
#[case(GrammarKind::ClosedEq)]
#[case(GrammarKind::Space)]
#[case(GrammarKind::TaggedBlock)]
#[case(GrammarKind::HostPrefStore)]
#[case(GrammarKind::HostProfileList)]
fn test_report_after_commit_is_compliant(#[case] kind: GrammarKind) {
    let target = TestTarget::with_content("target.conf", fixture(kind));
    let settings = EngineSettings::default().with_log_dir(target.log_dir());
    let mut log = ChangeLog::open(target.log_dir(), LogContext::disabled()).unwrap();
    let (adapter, spec) = adapter_and_spec(kind);

    let path = if kind.is_file_backed() {
        target.normalized()
    } else {
        kind.name().into()
    };
    let editor = KvEditor::new(adapter, path, spec, Intent::Present, LogContext::disabled());
    let mut session = Session::new(editor, &mut log, &settings, LogContext::disabled());
    session.set_event_id(EventId::new(RULE, 1));

    assert_eq!(session.report().unwrap(), Compliance::NonCompliant, "{kind}");
    assert!(session.fix().unwrap(), "{kind}");
    assert!(session.commit(), "{kind}");
    assert_eq!(session.report().unwrap(), Compliance::Compliant, "{kind}");

    // A further fix finds nothing left to do
    assert!(session.fix().unwrap());
    assert!(matches!(session.editor().staged(), Some(Staged::Nothing { .. })));
    assert_eq!(session.log().events().len(), 1);
}

#[rstest]
#[case(GrammarKind::OpenEq, fixtures::LOGROTATE_CONF)]
#[case(GrammarKind::ClosedEq, fixtures::SYSCTL_CONF)]
#[case(GrammarKind::Space, fixtures::SSHD_CONFIG)]
#[case(GrammarKind::TaggedBlock, fixtures::JAIL_CONF)]
#[case(GrammarKind::OpenEq, fixtures::CRLF_NO_FINAL_NEWLINE)]
fn test_undo_restores_original_bytes(#[case] kind: GrammarKind, #[case] original: &str) {
    let target = TestTarget::with_content("target.conf", original);
    let settings = EngineSettings::default().with_log_dir(target.log_dir());
    let mut log = ChangeLog::open(target.log_dir(), LogContext::disabled()).unwrap();
    let id = EventId::new(RULE, 1);

    {
        let editor = KvEditor::for_file(
            kind,
            target.path(),
            text_spec(kind),
            Intent::Present,
            LogContext::disabled(),
        )
        .unwrap();
        let mut session = Session::new(editor, &mut log, &settings, LogContext::disabled());
        session.set_event_id(id);
        assert!(session.fix().unwrap());
        assert!(session.commit());
    }
    assert_ne!(target.read(), original);

    log.undo(id, None).unwrap();
    assert_eq!(target.read_bytes(), original.as_bytes());
}

#[rstest]
#[case(GrammarKind::OpenEq, fixtures::LOGROTATE_CONF, "rotate")]
#[case(GrammarKind::ClosedEq, fixtures::SYSCTL_CONF, "net.ipv4.ip_forward")]
#[case(GrammarKind::Space, fixtures::SSHD_CONFIG, "PermitRootLogin")]
fn test_absent_intent_removes_key(
    #[case] kind: GrammarKind,
    #[case] original: &str,
    #[case] key: &str,
) {
    let target = TestTarget::with_content("target.conf", original);
    let settings = EngineSettings::default().with_log_dir(target.log_dir());
    let mut log = ChangeLog::open(target.log_dir(), LogContext::disabled()).unwrap();

    let editor = KvEditor::for_file(
        kind,
        target.path(),
        DesiredStateSpec::new().with(key, serde_json::Value::Null),
        Intent::Absent,
        LogContext::disabled(),
    )
    .unwrap();
    let mut session = Session::new(editor, &mut log, &settings, LogContext::disabled());

    assert_eq!(session.report().unwrap(), Compliance::NonCompliant);
    assert!(session.fix().unwrap());
    assert!(session.commit());
    assert_eq!(session.report().unwrap(), Compliance::Compliant);
    assert!(!target.read().lines().any(|line| line.starts_with(key)));
}
