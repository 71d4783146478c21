//! Page tree service scenarios
//!
//! Add, delete, move and publish flows checked against both the in-memory
//! tree and a reload from the row store.

use pagetree::{
    EnvBuilder, Error, PageModelRegistry, PageTreeService, PageVersion, PublishState, Result, ServiceBuilder,
    VersionKind, WidgetInstance, WidgetTypeInfo, WidgetTypeRegistry,
};
use serde_json::json;
use std::sync::Arc;

const FRAMES: usize = 3;

fn service() -> PageTreeService {
    let env = EnvBuilder::new().open_in_memory().unwrap();
    let models = PageModelRegistry::new().with_model("home", FRAMES).with_model("single", 1);
    let types = WidgetTypeRegistry::new()
        .with_type("content_viewer", WidgetTypeInfo::configurable(Some(json!({"modelId": "default"}))))
        .with_type("login_form", WidgetTypeInfo::logic());
    ServiceBuilder::new()
        .action_log_capacity(0)
        .build(env, Arc::new(models), Arc::new(types))
        .unwrap()
}

fn draft(title: &str) -> PageVersion {
    PageVersion::new("home", FRAMES).with_title("en", title).showable(true)
}

fn children(service: &PageTreeService, parent: &str) -> Vec<(String, i32)> {
    service
        .children(parent, VersionKind::Draft)
        .unwrap()
        .into_iter()
        .map(|n| (n.code, n.position))
        .collect()
}

#[test]
fn test_add_round_trip() -> Result<()> {
    let service = service();
    let version = draft("News")
        .with_extra_config(json!({"charset": "utf8"}))
        .with_widget(1, WidgetInstance::with_config("content_viewer", json!({"contentId": "NWS3"})))?;
    let added = service.add_page("homepage", "news", "free", version.clone())?;

    let loaded = service.get_draft_page("news")?;
    assert_eq!(loaded, added);
    assert_eq!(loaded.position, 1);
    assert_eq!(loaded.parent_code.as_deref(), Some("homepage"));
    assert!(loaded.draft.same_content(&version));
    assert!(loaded.draft.updated_at.is_some());
    assert_eq!(loaded.publish_state(), PublishState::Unpublished);

    service.refresh()?;
    assert_eq!(service.get_draft_page("news")?, added);
    Ok(())
}

#[test]
fn test_delete_middle_child_renumbers() -> Result<()> {
    let service = service();
    for code in ["first", "second", "third"] {
        service.add_page("homepage", code, "free", draft(code))?;
    }
    assert_eq!(
        children(&service, "homepage"),
        vec![("first".into(), 1), ("second".into(), 2), ("third".into(), 3)]
    );

    service.delete_page("second")?;
    let expected: Vec<(String, i32)> = vec![("first".into(), 1), ("third".into(), 2)];
    assert_eq!(children(&service, "homepage"), expected);

    service.refresh()?;
    assert_eq!(children(&service, "homepage"), expected);
    Ok(())
}

#[test]
fn test_move_step_at_boundaries() -> Result<()> {
    let service = service();
    for code in ["a", "b", "c"] {
        service.add_page("homepage", code, "free", draft(code))?;
    }

    assert!(!service.move_page_step("a", true)?);
    assert!(!service.move_page_step("c", false)?);
    assert!(!service.move_page_step("homepage", true)?);
    assert_eq!(children(&service, "homepage"), vec![("a".into(), 1), ("b".into(), 2), ("c".into(), 3)]);

    assert!(service.move_page_step("c", true)?);
    assert_eq!(children(&service, "homepage"), vec![("a".into(), 1), ("c".into(), 2), ("b".into(), 3)]);

    service.refresh()?;
    assert_eq!(children(&service, "homepage"), vec![("a".into(), 1), ("c".into(), 2), ("b".into(), 3)]);
    Ok(())
}

#[test]
fn test_reparent() -> Result<()> {
    let service = service();
    for code in ["a", "b", "c"] {
        service.add_page("homepage", code, "free", draft(code))?;
    }
    service.add_page("c", "c1", "free", draft("c1"))?;

    let moved = service.move_page("a", "c")?;
    assert_eq!(moved.parent_code.as_deref(), Some("c"));
    assert_eq!(moved.position, 2);
    assert_eq!(children(&service, "homepage"), vec![("b".into(), 1), ("c".into(), 2)]);
    assert_eq!(children(&service, "c"), vec![("c1".into(), 1), ("a".into(), 2)]);

    // Moving under the current parent changes nothing
    let same = service.move_page("a", "c")?;
    assert_eq!(same, moved);

    match service.move_page("c", "a") {
        Err(Error::CyclicMove { code, target }) => {
            assert_eq!(code, "c");
            assert_eq!(target, "a");
        }
        other => panic!("Expected CyclicMove, got {:?}", other),
    }
    match service.move_page("homepage", "b") {
        Err(Error::InvalidOperation(_)) => {}
        other => panic!("Expected InvalidOperation, got {:?}", other),
    }

    service.refresh()?;
    assert_eq!(children(&service, "c"), vec![("c1".into(), 1), ("a".into(), 2)]);
    Ok(())
}

#[test]
fn test_widget_move_scenario() -> Result<()> {
    let service = service();
    service.add_page("homepage", "p", "free", draft("p"))?;
    let widget_a = WidgetInstance::with_config("content_viewer", json!({"contentId": "ART1"}));

    service.join_widget("p", 1, widget_a.clone())?;
    service.move_widget("p", 1, 0)?;

    let page = service.get_draft_page("p")?;
    assert_eq!(page.draft.widgets[0], Some(widget_a.clone()));
    assert_eq!(page.draft.widgets[1], None);

    service.refresh()?;
    let page = service.get_draft_page("p")?;
    assert_eq!(page.draft.widgets[0], Some(widget_a));
    assert_eq!(page.draft.widgets[1], None);
    Ok(())
}

#[test]
fn test_widget_bounds() -> Result<()> {
    let service = service();
    service.add_page("homepage", "p", "free", draft("p"))?;
    service.add_page("homepage", "narrow", "free", PageVersion::new("single", 1))?;

    for (code, frame_count) in [("p", FRAMES), ("narrow", 1)] {
        match service.join_widget(code, frame_count as i32, WidgetInstance::new("login_form")) {
            Err(Error::FrameOutOfBounds { frame, frame_count: found }) => {
                assert_eq!(frame, frame_count as i32);
                assert_eq!(found, frame_count);
            }
            other => panic!("Expected FrameOutOfBounds, got {:?}", other),
        }
    }
    assert!(matches!(
        service.join_widget("p", -1, WidgetInstance::new("login_form")),
        Err(Error::FrameOutOfBounds { .. })
    ));
    assert!(matches!(service.move_widget("p", 0, 7), Err(Error::FrameOutOfBounds { .. })));
    assert!(matches!(service.remove_widget("p", 3), Err(Error::FrameOutOfBounds { .. })));
    Ok(())
}

#[test]
fn test_effective_config_uses_type_default() -> Result<()> {
    let service = service();
    service.add_page("homepage", "p", "free", draft("p"))?;
    service.join_widget("p", 0, WidgetInstance::new("content_viewer"))?;
    service.refresh()?;

    let page = service.get_draft_page("p")?;
    let widget = page.draft.widgets[0].clone().unwrap();
    assert_eq!(widget.config, None);
    let types = WidgetTypeRegistry::new()
        .with_type("content_viewer", WidgetTypeInfo::configurable(Some(json!({"modelId": "default"}))));
    assert_eq!(widget.effective_config(&types), Some(json!({"modelId": "default"})));

    service.remove_widget("p", 0)?;
    service.remove_widget("p", 0)?;
    assert_eq!(service.get_draft_page("p")?.draft.widgets.occupied().count(), 0);
    Ok(())
}

#[test]
fn test_publish_edit_republish() -> Result<()> {
    let service = service();
    service.add_page("homepage", "about", "free", draft("About"))?;

    let published = service.set_page_online("about")?;
    assert_eq!(published.publish_state(), PublishState::PublishedClean);
    assert_eq!(service.get_online_page("about")?.online, published.online);

    service.update_page("about", draft("About us"))?;
    let page = service.get_draft_page("about")?;
    assert_eq!(page.publish_state(), PublishState::PublishedDirty);
    let online = page.online.as_ref().unwrap();
    assert_ne!(online.titles, page.draft.titles);
    assert_eq!(online.title("en"), Some("About"));

    let republished = service.set_page_online("about")?;
    assert_eq!(republished.publish_state(), PublishState::PublishedClean);
    service.refresh()?;
    assert_eq!(service.get_draft_page("about")?.publish_state(), PublishState::PublishedClean);
    Ok(())
}

#[test]
fn test_publish_unpublish_keeps_draft() -> Result<()> {
    let service = service();
    let version = draft("Contacts").with_widget(2, WidgetInstance::new("login_form"))?;
    service.add_page("homepage", "contacts", "free", version)?;
    let before = service.get_draft_page("contacts")?.draft;

    service.set_page_online("contacts")?;
    let offline = service.set_page_offline("contacts")?;
    assert!(offline.online.is_none());
    assert_eq!(offline.publish_state(), PublishState::Unpublished);
    assert!(offline.draft.same_content(&before));
    assert!(matches!(
        service.get_online_page("contacts"),
        Err(Error::NotFound { version: VersionKind::Online, .. })
    ));

    // Taking an unpublished page offline is a no-op
    let again = service.set_page_offline("contacts")?;
    assert_eq!(again, offline);

    service.refresh()?;
    let reloaded = service.get_draft_page("contacts")?;
    assert!(reloaded.online.is_none());
    assert!(reloaded.draft.same_content(&before));
    Ok(())
}

#[test]
fn test_update_group() -> Result<()> {
    let service = service();
    service.add_page("homepage", "reserved", "free", draft("Reserved"))?;
    let updated = service.update_page_group("reserved", "administrators")?;
    assert_eq!(updated.group, "administrators");
    service.refresh()?;
    assert_eq!(service.get_draft_page("reserved")?.group, "administrators");
    Ok(())
}

#[test]
fn test_missing_pages() {
    let service = service();
    for result in [
        service.get_draft_page("ghost").map(|_| ()),
        service.update_page("ghost", draft("x")).map(|_| ()),
        service.delete_page("ghost"),
        service.set_page_online("ghost").map(|_| ()),
        service.join_widget("ghost", 0, WidgetInstance::new("login_form")),
    ] {
        match result {
            Err(Error::NotFound { code, version: VersionKind::Draft }) => assert_eq!(code, "ghost"),
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }
}
