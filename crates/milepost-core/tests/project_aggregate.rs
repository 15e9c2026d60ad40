//! Project aggregate behaviour through the store: creation, validation,
//! membership, reassignment, update events, and destruction.

use milepost_core::db::Store;
use milepost_core::error::ProjectError;
use milepost_core::model::event::{EVENTABLE_PROJECT, EventType};
use milepost_core::model::function::{Function, User};
use milepost_core::model::ids::{FunctionId, MemberId, ProjectId, UserId};
use milepost_core::model::project::{
    Project, ProjectAttributes, ProjectChanges, ReassignOutcome, ReassignRejection,
};
use milepost_core::model::validation::{
    FIELD_MEMBERS, FIELD_NAME, FIELD_SAME_MEMBERS, MSG_BLANK, MSG_DUPLICATE_MEMBER, MSG_NO_ADMIN,
    MSG_NO_MEMBERS, MSG_TAKEN,
};
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Fixture {
    store: Store,
    admin: Function,
    developer: Function,
    ada: User,
    bob: User,
}

fn fixture() -> Fixture {
    let mut store = Store::open_in_memory().expect("open store");
    let (admin, _) = store
        .seed_default_functions("Admin", "Member")
        .expect("seed registry");
    let developer = store
        .create_function("Developer", false)
        .expect("developer role");
    let ada = store.create_user("ada").expect("ada");
    let bob = store.create_user("bob").expect("bob");
    Fixture {
        store,
        admin,
        developer,
        ada,
        bob,
    }
}

fn create(fx: &mut Fixture, name: &str) -> Project {
    fx.store
        .create_project(ProjectAttributes::named(name), Some(fx.ada.id))
        .expect("create project")
}

fn count_rows(store: &Store, table: &str, project_id: ProjectId) -> i64 {
    store
        .connection()
        .query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE project_id = ?1"),
            [project_id],
            |row| row.get(0),
        )
        .expect("count rows")
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[test]
fn created_project_has_single_admin_member_and_one_event() {
    let mut fx = fixture();
    let project = create(&mut fx, "apollo");
    let id = project.id.expect("persisted");

    assert_eq!(project.members.len(), 1);
    let founder = &project.members[0];
    assert_eq!(founder.user_id, fx.ada.id);
    assert_eq!(founder.function_id, fx.admin.id);
    assert!(founder.is_admin);
    assert!(project.actor_on_create().is_none());
    assert!(project.validate(false).is_empty());

    let events = fx.store.list_events(id).expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Created);
    assert_eq!(events[0].user_id, Some(fx.ada.id));
    assert_eq!(events[0].eventable_type, EVENTABLE_PROJECT);
    assert_eq!(events[0].eventable_id, id.get());

    assert_eq!(fx.store.load_project(id).expect("reload"), project);
}

#[test]
fn creation_without_founder_writes_nothing() {
    let mut fx = fixture();
    let err = fx
        .store
        .create_project(ProjectAttributes::named("apollo"), None)
        .expect_err("missing actor");
    assert!(matches!(err, ProjectError::MissingActor));
    assert!(fx.store.list_projects().expect("list").is_empty());

    let events: i64 = fx
        .store
        .connection()
        .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
        .expect("count events");
    assert_eq!(events, 0);
}

#[test]
fn saving_new_project_without_creator_is_missing_actor() {
    let mut fx = fixture();
    let mut project = Project::new(ProjectAttributes::named("apollo"));
    project.add_member(&fx.ada, &fx.admin);

    let err = fx.store.save_project(&mut project).expect_err("no creator");
    assert!(matches!(err, ProjectError::MissingActor));
    assert!(project.is_new());
}

#[test]
fn creation_needs_an_admin_function() {
    let mut store = Store::open_in_memory().expect("open store");
    store.create_function("Member", false).expect("member role");
    let ada = store.create_user("ada").expect("ada");

    let err = store
        .create_project(ProjectAttributes::named("apollo"), Some(ada.id))
        .expect_err("no admin role");
    assert!(matches!(err, ProjectError::NoAdminFunction));
}

#[test]
fn blank_and_taken_names_are_rejected() {
    let mut fx = fixture();
    create(&mut fx, "apollo");

    let err = fx
        .store
        .create_project(ProjectAttributes::named("apollo"), Some(fx.bob.id))
        .expect_err("taken");
    assert_eq!(
        err.validation_errors().expect("validation").on(FIELD_NAME),
        [MSG_TAKEN]
    );

    let err = fx
        .store
        .create_project(ProjectAttributes::named("  "), Some(fx.bob.id))
        .expect_err("blank");
    assert_eq!(
        err.validation_errors().expect("validation").on(FIELD_NAME),
        [MSG_BLANK]
    );
    assert_eq!(fx.store.list_projects().expect("list").len(), 1);
}

// ---------------------------------------------------------------------------
// Member-set invariants
// ---------------------------------------------------------------------------

#[test]
fn empty_member_set_fails_validation() {
    let mut fx = fixture();
    let mut project = create(&mut fx, "apollo");
    project.members.clear();

    let err = fx.store.save_project(&mut project).expect_err("empty");
    let errors = err.validation_errors().expect("validation");
    assert_eq!(errors.on(FIELD_MEMBERS), [MSG_NO_MEMBERS, MSG_NO_ADMIN]);

    let stored = fx.store.load_project(project.id.expect("id")).expect("load");
    assert_eq!(stored.members.len(), 1);
}

#[test]
fn members_without_admin_fail_validation() {
    let mut fx = fixture();
    let mut project = create(&mut fx, "apollo");
    project.members[0].function_id = fx.developer.id;

    let err = fx.store.save_project(&mut project).expect_err("no admin");
    assert_eq!(
        err.validation_errors().expect("validation").on(FIELD_MEMBERS),
        [MSG_NO_ADMIN]
    );
}

#[test]
fn duplicate_users_fail_validation() {
    let mut fx = fixture();
    let mut project = create(&mut fx, "apollo");
    let mut twin = project.members[0].clone();
    twin.id = MemberId(2);
    project.members.push(twin);

    let err = fx.store.save_project(&mut project).expect_err("duplicate");
    assert_eq!(
        err.validation_errors()
            .expect("validation")
            .on(FIELD_SAME_MEMBERS),
        [MSG_DUPLICATE_MEMBER]
    );
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

#[test]
fn add_member_is_idempotent_per_user() {
    let mut fx = fixture();
    let id = create(&mut fx, "apollo").id.expect("id");

    assert!(
        fx.store
            .add_member(id, fx.bob.id, fx.developer.id, Some(fx.ada.id))
            .expect("first add")
    );
    assert!(
        !fx.store
            .add_member(id, fx.bob.id, fx.admin.id, Some(fx.ada.id))
            .expect("second add")
    );

    let project = fx.store.load_project(id).expect("load");
    assert_eq!(project.members.len(), 2);
    let bob = project.membership_of(fx.bob.id).expect("bob is a member");
    assert_eq!(bob.function_name, "Developer");
    assert!(!bob.is_admin);

    // one created event plus one update for the effective add
    assert_eq!(fx.store.list_events(id).expect("events").len(), 2);
}

#[test]
fn add_member_rejects_unknown_references() {
    let mut fx = fixture();
    let id = create(&mut fx, "apollo").id.expect("id");

    assert!(matches!(
        fx.store.add_member(id, UserId(404), fx.developer.id, None),
        Err(ProjectError::NotFound { kind: "user", .. })
    ));
    assert!(matches!(
        fx.store.add_member(id, fx.bob.id, FunctionId(404), None),
        Err(ProjectError::NotFound { kind: "function", .. })
    ));
    assert!(matches!(
        fx.store.add_member(ProjectId(404), fx.bob.id, fx.developer.id, None),
        Err(ProjectError::NotFound { kind: "project", .. })
    ));
}

// ---------------------------------------------------------------------------
// Reassignment
// ---------------------------------------------------------------------------

fn project_with_bob(fx: &mut Fixture) -> ProjectId {
    let id = create(fx, "apollo").id.expect("id");
    fx.store
        .add_member(id, fx.bob.id, fx.developer.id, None)
        .expect("add bob");
    id
}

#[test]
fn reassignment_without_admin_target_changes_nothing() {
    let mut fx = fixture();
    let id = project_with_bob(&mut fx);
    let before = fx.store.load_project(id).expect("load");

    let batch = BTreeMap::from([(MemberId(1), fx.developer.id)]);
    let outcome = fx
        .store
        .reassign_functions(id, &batch, Some(fx.ada.id))
        .expect("reassign");

    assert!(!outcome.is_applied());
    assert_eq!(outcome.rejection(), Some(&ReassignRejection::NoAdminFunction));
    assert_eq!(fx.store.load_project(id).expect("reload"), before);
}

#[test]
fn reassignment_with_unknown_ids_applies_none() {
    let mut fx = fixture();
    let id = project_with_bob(&mut fx);
    let before = fx.store.load_project(id).expect("load");

    let batch = BTreeMap::from([
        (MemberId(2), fx.admin.id),
        (MemberId(9), fx.developer.id),
        (MemberId(1), FunctionId(77)),
    ]);
    let outcome = fx
        .store
        .reassign_functions(id, &batch, Some(fx.ada.id))
        .expect("reassign");

    assert_eq!(
        outcome,
        ReassignOutcome::Rejected {
            rejection: ReassignRejection::UnknownReferences {
                members: vec![MemberId(9)],
                functions: vec![FunctionId(77)],
            }
        }
    );
    assert_eq!(fx.store.load_project(id).expect("reload"), before);
}

#[test]
fn swapping_admin_applies_every_pair() {
    let mut fx = fixture();
    let id = project_with_bob(&mut fx);

    let batch = BTreeMap::from([(MemberId(1), fx.developer.id), (MemberId(2), fx.admin.id)]);
    let outcome = fx
        .store
        .reassign_functions(id, &batch, Some(fx.ada.id))
        .expect("reassign");
    assert!(outcome.is_applied());

    let project = fx.store.load_project(id).expect("load");
    let ada = project.membership_of(fx.ada.id).expect("ada");
    let bob = project.membership_of(fx.bob.id).expect("bob");
    assert_eq!((ada.function_name.as_str(), ada.is_admin), ("Developer", false));
    assert_eq!((bob.function_name.as_str(), bob.is_admin), ("Admin", true));

    let latest = fx.store.latest_event(id).expect("query").expect("event");
    assert_eq!(latest.event_type, EventType::Updated);
}

#[test]
fn reassignment_refreshes_flags_rewritten_in_registry() {
    let mut fx = fixture();
    let id = project_with_bob(&mut fx);

    // Developer becomes the only admin role; stored members still carry the
    // old flags until the next save.
    fx.store
        .set_admin_flags(&BTreeSet::from([fx.developer.id]))
        .expect("rewrite flags");

    let batch = BTreeMap::from([(MemberId(1), fx.developer.id)]);
    assert!(
        fx.store
            .reassign_functions(id, &batch, None)
            .expect("reassign")
            .is_applied()
    );

    let project = fx.store.load_project(id).expect("load");
    assert!(project.members.iter().all(|member| member.is_admin));
}

// ---------------------------------------------------------------------------
// Update events
// ---------------------------------------------------------------------------

#[test]
fn update_logs_event_only_with_actor() {
    let mut fx = fixture();
    let mut project = create(&mut fx, "apollo");
    let id = project.id.expect("id");

    fx.store
        .update_project(
            &mut project,
            ProjectChanges {
                description: Some(Some("to the moon".into())),
                ..ProjectChanges::default()
            },
            None,
        )
        .expect("silent update");
    assert_eq!(fx.store.list_events(id).expect("events").len(), 1);

    fx.store
        .update_project(
            &mut project,
            ProjectChanges {
                name: Some("artemis".into()),
                ..ProjectChanges::default()
            },
            Some(fx.bob.id),
        )
        .expect("logged update");

    let events = fx.store.list_events(id).expect("events");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, EventType::Updated);
    assert_eq!(events[0].user_id, Some(fx.bob.id));
    assert!(project.actor_on_update().is_none());

    let stored = fx.store.find_project_by_name("artemis").expect("find").expect("renamed");
    assert_eq!(stored.description.as_deref(), Some("to the moon"));
    assert!(fx.store.find_project_by_name("apollo").expect("find").is_none());
}

#[test]
fn failed_update_keeps_attempted_values_in_memory_only() {
    let mut fx = fixture();
    create(&mut fx, "apollo");
    let mut project = create(&mut fx, "gemini");

    let err = fx
        .store
        .update_project(
            &mut project,
            ProjectChanges {
                name: Some("apollo".into()),
                ..ProjectChanges::default()
            },
            Some(fx.ada.id),
        )
        .expect_err("name taken");
    assert!(matches!(err, ProjectError::Invalid(_)));
    assert_eq!(project.name, "apollo");

    let stored = fx.store.load_project(project.id.expect("id")).expect("load");
    assert_eq!(stored.name, "gemini");
    assert_eq!(fx.store.list_events(stored.id.expect("id")).expect("events").len(), 1);
}

// ---------------------------------------------------------------------------
// Destruction
// ---------------------------------------------------------------------------

#[test]
fn destroy_leaves_no_orphans() {
    let mut fx = fixture();
    let doomed = project_with_bob(&mut fx);
    let keeper = create(&mut fx, "gemini").id.expect("id");

    fx.store
        .create_milestone(doomed, "v1", Some(1))
        .expect("milestone");
    fx.store
        .create_ticket(doomed, "Launch", ["foo", "bar"])
        .expect("ticket");
    fx.store
        .create_ticket(keeper, "Orbit", ["foo"])
        .expect("other ticket");

    let report = fx.store.destroy_project(doomed).expect("destroy");
    assert_eq!(report.members, 2);
    assert_eq!(report.milestones, 1);
    assert_eq!(report.tickets, 1);
    assert_eq!(report.events, 1);

    for table in ["project_members", "milestones", "tickets", "events"] {
        assert_eq!(count_rows(&fx.store, table, doomed), 0, "{table} orphaned");
    }
    let tags: i64 = fx
        .store
        .connection()
        .query_row("SELECT COUNT(*) FROM ticket_tags", [], |row| row.get(0))
        .expect("count tags");
    assert_eq!(tags, 1);

    assert!(matches!(
        fx.store.load_project(doomed),
        Err(ProjectError::NotFound { .. })
    ));
    assert!(matches!(
        fx.store.destroy_project(doomed),
        Err(ProjectError::NotFound { .. })
    ));
    assert_eq!(count_rows(&fx.store, "tickets", keeper), 1);
}
