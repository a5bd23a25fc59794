mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use browser_window::hooks::BeforePopup;
use browser_window::{
    BrowserWindowConfig, EngineReply, EngineSignal, LifecycleState, Platform, PopupDecision,
    RejectReason, WindowKind, WindowProperty,
};
use common::{harness, harness_with};

#[test]
fn popups_disabled_rejects_without_registering() {
    let h = harness_with(BrowserWindowConfig {
        enable_window_popup: false,
        platform: Some(Platform::ImmediateClose),
        ..BrowserWindowConfig::default()
    });
    let main = h.windows.create_browser_window(None).unwrap();

    let decision = main.request_popup("https://popup.example");
    assert!(matches!(decision, PopupDecision::Rejected(RejectReason::Disabled)));
    assert!(decision.cancels_engine_popup());
    assert_eq!(h.windows.registry().len(), 1);
    assert_eq!(h.windows.live_popups(), 0);
    assert_eq!(h.backend.window_count(), 1);
}

#[test]
fn accepted_popup_is_registered_and_shown_on_the_ui_thread() {
    let h = harness(Platform::ImmediateClose);
    let main = h.windows.create_browser_window(None).unwrap();
    h.drain();

    let decision = main.request_popup("https://popup.example");
    assert!(!decision.cancels_engine_popup());
    let popup = decision.popup().cloned().unwrap();

    assert_eq!(popup.kind(), WindowKind::PopupSubBrowser);
    assert_eq!(popup.lifecycle(), LifecycleState::EngineCreating);
    assert!(h.windows.registry().contains(popup.id().unwrap()));
    let engine = h.backend.engine(1);
    assert_eq!(engine.options.default_url.as_deref(), Some("https://popup.example"));
    assert!(engine.options.independent_events);

    assert!(!h.rec().has("w1:show"));
    h.drain();
    assert!(h.rec().has("w1:show"));
    assert!(!h.rec().has("w1:show_modal"));
}

#[test]
fn modal_property_shows_popup_modally() {
    let h = harness_with(BrowserWindowConfig {
        platform: Some(Platform::ImmediateClose),
        window: WindowProperty {
            is_show_modal: true,
            ..WindowProperty::default()
        },
        ..BrowserWindowConfig::default()
    });
    let main = h.windows.create_browser_window(None).unwrap();
    h.drain();
    assert!(main.request_popup("https://popup.example").popup().is_some());
    h.drain();
    assert!(h.rec().has("w1:show_modal"));
}

#[test]
fn veto_rejects_after_every_hook_ran() {
    let h = harness(Platform::ImmediateClose);
    let main = h.windows.create_browser_window(None).unwrap();
    h.drain();
    let calls = Arc::new(AtomicUsize::new(0));
    for veto in [true, false] {
        let calls = Arc::clone(&calls);
        main.register_hook(BeforePopup, move |args| {
            assert_eq!(args.target_url, "https://ads.example");
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(veto)
        });
    }

    let decision = main.request_popup("https://ads.example");
    assert!(matches!(decision, PopupDecision::Rejected(RejectReason::Vetoed)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.windows.registry().ids(), vec![main.id().unwrap()]);

    h.drain();
    assert!(!h.rec().has("w1:show"));
    // The vetoed popup's native window is closed, not leaked.
    assert!(h.rec().has("w1:close"));
    assert!(h.rec().has("s1:free"));
    assert_eq!(h.windows.live_popups(), 0);
    assert_eq!(h.windows.idle_popups(), 1);
}

#[test]
fn hooks_see_the_popup_and_can_deny_script_access() {
    let h = harness(Platform::ImmediateClose);
    let main = h.windows.create_browser_window(None).unwrap();
    h.drain();
    let source = main.id();
    main.register_hook(BeforePopup, move |args| {
        assert_eq!(args.source_id, source);
        assert_eq!(args.popup.kind(), WindowKind::PopupSubBrowser);
        args.no_javascript_access = true;
        Ok(false)
    });

    match main.request_popup("https://popup.example") {
        PopupDecision::Accepted {
            no_javascript_access,
            ..
        } => assert!(no_javascript_access),
        PopupDecision::Rejected(reason) => panic!("rejected: {reason:?}"),
    }
}

#[test]
fn pool_size_caps_live_popups_and_frees_slots_on_destroy() {
    let h = harness(Platform::ImmediateClose);
    let main = h.windows.create_browser_window(None).unwrap();
    h.drain();

    let first = main.request_popup("https://one.example").popup().cloned().unwrap();
    assert_eq!(h.windows.live_popups(), 1);
    assert!(matches!(
        main.request_popup("https://two.example"),
        PopupDecision::Rejected(RejectReason::PoolExhausted)
    ));

    h.drain();
    first.on_activate();
    first.on_engine_close();
    first.on_before_close();
    h.drain();
    assert_eq!(first.lifecycle(), LifecycleState::Destroyed);
    assert_eq!(h.windows.live_popups(), 0);
    assert_eq!(h.windows.idle_popups(), 1);

    assert!(main.request_popup("https://three.example").popup().is_some());
}

#[test]
fn larger_pool_allows_concurrent_popups() {
    let h = harness_with(BrowserWindowConfig {
        popup_pool_size: 3,
        platform: Some(Platform::ImmediateClose),
        ..BrowserWindowConfig::default()
    });
    let main = h.windows.create_browser_window(None).unwrap();
    h.drain();
    assert_eq!(h.windows.idle_popups(), 3);
    let ids: Vec<_> = (0..3)
        .map(|n| {
            main.request_popup(&format!("https://{n}.example"))
                .popup()
                .and_then(|p| p.id())
                .unwrap()
        })
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.windows(2).all(|w| w[0] != w[1]));
    assert!(main.request_popup("https://4.example").cancels_engine_popup());
    assert_eq!(h.windows.registry().len(), 4);
}

#[test]
fn popups_are_prepared_on_the_first_ui_turn() {
    let h = harness(Platform::ImmediateClose);
    let main = h.windows.create_browser_window(None).unwrap();

    // Nothing is built until the UI thread runs.
    assert_eq!(h.windows.idle_popups(), 0);
    assert!(matches!(
        main.request_popup("https://early.example"),
        PopupDecision::Rejected(RejectReason::PoolExhausted)
    ));

    h.drain();
    assert_eq!(h.windows.idle_popups(), 1);
    assert_eq!(h.windows.prewarm_popups(), 0);
    let windows_before = h.backend.window_count();

    let popup = main.request_popup("https://popup.example").popup().cloned().unwrap();
    assert_eq!(h.backend.window_count(), windows_before);
    assert_eq!(h.windows.idle_popups(), 0);
    assert_eq!(popup.lifecycle(), LifecycleState::EngineCreating);
}

#[test]
fn before_popup_signal_routes_through_the_adapter() {
    let h = harness(Platform::ImmediateClose);
    let main = h.windows.create_browser_window(None).unwrap();
    h.drain();

    let reply = h.windows.engine_signal(
        main.id().unwrap(),
        EngineSignal::BeforePopup {
            target_url: "https://popup.example".into(),
        },
    );
    match reply {
        Some(EngineReply::Popup(decision)) => assert!(!decision.cancels_engine_popup()),
        _ => panic!("expected a popup decision"),
    }
    assert_eq!(h.windows.registry().len(), 2);
}

#[test]
fn popup_requested_off_the_ui_thread_builds_no_toolkit_window() {
    let h = harness(Platform::ImmediateClose);
    let main = h.windows.create_browser_window(None).unwrap();
    let id = main.id().unwrap();
    h.drain();
    let windows_before = h.backend.window_count();
    let events_before = h.rec().events().len();

    let accepted = thread::scope(|scope| {
        scope
            .spawn(|| {
                let reply = h.windows.engine_signal(
                    id,
                    EngineSignal::BeforePopup {
                        target_url: "https://popup.example".into(),
                    },
                );
                matches!(reply, Some(EngineReply::Popup(ref d)) if !d.cancels_engine_popup())
            })
            .join()
            .unwrap()
    });

    assert!(accepted);
    assert_eq!(h.backend.window_count(), windows_before);
    // Only the engine handle was built; every toolkit call waits for the UI turn.
    assert_eq!(h.rec().events().len(), events_before);
    h.drain();
    assert!(h.rec().has("w1:show"));
}
