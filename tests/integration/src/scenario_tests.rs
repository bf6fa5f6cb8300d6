//! End-to-end reconciliation scenarios
//!
//! Each test drives a rule the way a caller would: open the change log,
//! begin a rule run, build an editor and session, then report, fix and
//! commit against a real file.

use confix_content::{DesiredStateSpec, GrammarKind, Intent};
use confix_core::{
    ChangeLog, CommitOutcome, Compliance, EngineSettings, KvEditor, LogContext, RuleRun, Session,
    SessionState,
};
use confix_test_utils::{TestTarget, fixtures};
use pretty_assertions::assert_eq;

// =============================================================================
// Test Infrastructure
// =============================================================================

const RULE: u32 = 57;

struct Harness {
    target: TestTarget,
    settings: EngineSettings,
    log: ChangeLog,
}

impl Harness {
    fn new(target: TestTarget) -> Self {
        let settings = EngineSettings::default().with_log_dir(target.log_dir());
        let log = ChangeLog::open(settings.log_dir.clone(), LogContext::disabled()).unwrap();
        Self {
            target,
            settings,
            log,
        }
    }

    fn editor(&self, kind: GrammarKind, spec: DesiredStateSpec) -> KvEditor {
        KvEditor::for_file(
            kind,
            self.target.path(),
            spec,
            Intent::Present,
            LogContext::for_rule(RULE, self.target.normalized().as_str()),
        )
        .unwrap()
    }

    /// One complete run of `rule`: purge, report, fix, commit.
    fn run_rule(&mut self, kind: GrammarKind, spec: DesiredStateSpec) -> RuleRun {
        let mut run = RuleRun::begin(&mut self.log, RULE).unwrap();
        let editor = self.editor(kind, spec);
        let mut session = Session::new(editor, &mut self.log, &self.settings, LogContext::disabled());
        session.set_event_id(run.next_id().unwrap());

        if !session.report().unwrap().is_compliant() {
            assert!(session.fix().unwrap());
            assert!(session.commit());
        }
        run
    }
}

// =============================================================================
// Scenario A: space grammar keepalive
// =============================================================================

#[test]
fn test_sshd_keepalive_is_corrected() {
    let mut h = Harness::new(TestTarget::with_content(
        "sshd_config",
        "ClientAliveInterval 300\n",
    ));
    let spec = DesiredStateSpec::new()
        .with("ClientAliveInterval", 900)
        .with("ClientAliveCountMax", 0);

    let editor = h.editor(GrammarKind::Space, spec);
    let mut session = Session::new(editor, &mut h.log, &h.settings, LogContext::disabled());

    assert_eq!(session.report().unwrap(), Compliance::NonCompliant);
    assert!(session.fix().unwrap());
    assert!(session.commit());
    assert_eq!(session.report().unwrap(), Compliance::Compliant);

    h.target
        .assert_content("ClientAliveInterval 900\nClientAliveCountMax 0\n");
}

// =============================================================================
// Scenario B: empty open-eq target
// =============================================================================

#[test]
fn test_empty_logrotate_gets_every_key_in_order() {
    let mut h = Harness::new(TestTarget::with_content("logrotate.conf", ""));
    let keys = [
        ("rotate", "4"),
        ("maxage", "365"),
        ("minsize", "1M"),
        ("maxsize", "100M"),
        ("compress", "yes"),
        ("delaycompress", "yes"),
        ("missingok", "yes"),
        ("notifempty", "yes"),
        ("create", "0640"),
        ("dateext", "yes"),
        ("su", "root"),
        ("tabooext", "bak"),
    ];
    let spec = keys
        .iter()
        .fold(DesiredStateSpec::new(), |spec, (k, v)| spec.with(*k, *v));

    let editor = h.editor(GrammarKind::OpenEq, spec);
    let mut session = Session::new(editor, &mut h.log, &h.settings, LogContext::disabled());

    assert_eq!(session.report().unwrap(), Compliance::NonCompliant);
    assert!(session.fix().unwrap());
    assert!(session.commit());

    let expected: String = keys.iter().map(|(k, v)| format!("{k} = {v}\n")).collect();
    h.target.assert_content(&expected);
}

// =============================================================================
// Scenario C: repeated commit
// =============================================================================

#[test]
fn test_commit_twice_without_fix() {
    let mut h = Harness::new(TestTarget::with_content(
        "sysctl.conf",
        fixtures::SYSCTL_CONF,
    ));
    let editor = h.editor(
        GrammarKind::ClosedEq,
        DesiredStateSpec::new().with("net.ipv4.ip_forward", 0),
    );
    let mut session = Session::new(editor, &mut h.log, &h.settings, LogContext::disabled());
    session.set_event_id(confix_core::EventId::new(RULE, 1));

    assert!(session.fix().unwrap());
    assert!(session.commit());
    let after_first = h.target.read();

    assert!(session.commit());
    assert_eq!(session.commit_detailed().unwrap(), CommitOutcome::NoChange);
    assert_eq!(session.state(), SessionState::Committed);
    assert_eq!(session.log().events().len(), 1);
    assert_eq!(h.target.read(), after_first);
}

// =============================================================================
// Scenario D: successive runs of one rule
// =============================================================================

#[test]
fn test_second_run_replaces_first_runs_events() {
    let mut h = Harness::new(TestTarget::with_content(
        "sshd_config",
        fixtures::SSHD_CONFIG,
    ));

    let first = h.run_rule(
        GrammarKind::Space,
        DesiredStateSpec::new().with("PermitRootLogin", "no"),
    );
    assert_eq!(h.log.find_rule_changes(RULE).len(), 1);

    let second = h.run_rule(
        GrammarKind::Space,
        DesiredStateSpec::new().with("Port", 2222),
    );

    let ids = h.log.find_rule_changes(RULE);
    assert_eq!(ids.len(), 1);
    let event = h.log.get(ids[0]).unwrap();
    assert_eq!(event.run_id, Some(second.run_id()));
    assert_ne!(event.run_id, Some(first.run_id()));

    // Only run two is reversible; run one's edit stays in place
    h.log.undo(ids[0], None).unwrap();
    let content = h.target.read();
    assert!(content.contains("Port 22\n"));
    assert!(content.contains("PermitRootLogin no\n"));
}

// =============================================================================
// At most one undo chain
// =============================================================================

#[test]
fn test_repeated_fix_yields_one_coherent_event() {
    let mut h = Harness::new(TestTarget::with_content(
        "jail.local",
        fixtures::JAIL_CONF,
    ));
    let mut run = RuleRun::begin(&mut h.log, RULE).unwrap();
    let id = run.next_id().unwrap();

    {
        let spec = DesiredStateSpec::from_tagged_mapping(&serde_json::json!({
            "sshd": {"enabled": true}
        }))
        .unwrap();
        let editor = h.editor(GrammarKind::TaggedBlock, spec);
        let mut session = Session::new(editor, &mut h.log, &h.settings, LogContext::disabled());
        session.set_event_id(id);

        for _ in 0..5 {
            assert!(session.fix().unwrap());
        }
        session.update_data(
            DesiredStateSpec::from_tagged_mapping(&serde_json::json!({
                "sshd": {"enabled": true, "maxretry": 3}
            }))
            .unwrap(),
        );
        assert!(session.fix().unwrap());
        assert!(session.fix().unwrap());
        assert!(session.commit());
        assert!(h.target.stray_files().is_empty());
    }

    assert_eq!(h.log.find_rule_changes(RULE), vec![id]);
    h.log.undo(id, None).unwrap();
    h.target.assert_content(fixtures::JAIL_CONF);
    assert!(h.log.events().is_empty());
}
