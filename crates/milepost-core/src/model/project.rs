//! The project aggregate.
//!
//! A [`Project`] owns an ordered member list. Each member references a user
//! and a function and carries denormalized copies of the user login, the
//! function name, and the function's admin flag. Those copies are refreshed by
//! [`normalize_member`] on every save, and all four save-time invariants are
//! checked together by [`Project::validate`].
//!
//! Nothing here touches storage; [`crate::db::projects`] wraps these rules in
//! transactions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::function::{Function, User};
use super::ids::{FunctionId, MemberId, ProjectId, UserId};
use super::validation::{
    FIELD_MEMBERS, FIELD_NAME, FIELD_SAME_MEMBERS, MSG_BLANK, MSG_DUPLICATE_MEMBER, MSG_NO_ADMIN,
    MSG_NO_MEMBERS, MSG_TAKEN, ValidationErrors,
};

/// Attributes accepted when building a new project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectAttributes {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl ProjectAttributes {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Partial update of a project's own attributes.
///
/// `description: Some(None)` clears the description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

impl ProjectChanges {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

/// One (user, function) pair inside a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMember {
    pub id: MemberId,
    pub user_id: UserId,
    pub user_name: String,
    pub function_id: FunctionId,
    pub function_name: String,
    pub is_admin: bool,
}

/// Refresh a member's denormalized fields from the records it references.
///
/// Pure: the referenced function and user are looked up by the caller.
#[must_use]
pub fn normalize_member(member: &ProjectMember, function: &Function, user: &User) -> ProjectMember {
    ProjectMember {
        id: member.id,
        user_id: member.user_id,
        user_name: user.login.clone(),
        function_id: member.function_id,
        function_name: function.name.clone(),
        is_admin: function.is_admin,
    }
}

/// The project aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// `None` until the project is first persisted.
    pub id: Option<ProjectId>,
    pub name: String,
    pub description: Option<String>,
    /// Next ticket number to issue; `None` until the first issuance.
    pub num_ticket: Option<i64>,
    /// Tag frequencies across the project's tickets. Only the tag
    /// aggregator writes this.
    pub tag_counts: BTreeMap<String, u64>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
    pub members: Vec<ProjectMember>,
    #[serde(skip)]
    actor_on_create: Option<UserId>,
    #[serde(skip)]
    actor_on_update: Option<UserId>,
}

impl Project {
    /// Build an unsaved project with no members.
    #[must_use]
    pub fn new(attributes: ProjectAttributes) -> Self {
        Self {
            id: None,
            name: attributes.name,
            description: attributes.description,
            num_ticket: None,
            tag_counts: BTreeMap::new(),
            created_at_us: 0,
            updated_at_us: 0,
            members: Vec::new(),
            actor_on_create: None,
            actor_on_update: None,
        }
    }

    /// Build an unsaved project whose only member is `founder` holding
    /// `admin_function`, with the creation attributed to `founder`.
    #[must_use]
    pub fn new_with_admin_member(
        attributes: ProjectAttributes,
        founder: &User,
        admin_function: &Function,
    ) -> Self {
        let mut project = Self::new(attributes);
        project.add_member(founder, admin_function);
        project.actor_on_create = Some(founder.id);
        project
    }

    /// Alias for [`Project::name`].
    #[must_use]
    pub fn title(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.id.is_none()
    }

    /// Attribute the pending creation to `actor`.
    pub const fn set_actor_on_create(&mut self, actor: UserId) {
        self.actor_on_create = Some(actor);
    }

    /// Attribute the pending update to `actor`; `None` means the update is
    /// not logged.
    pub const fn set_actor_on_update(&mut self, actor: Option<UserId>) {
        self.actor_on_update = actor;
    }

    #[must_use]
    pub const fn actor_on_create(&self) -> Option<UserId> {
        self.actor_on_create
    }

    #[must_use]
    pub const fn actor_on_update(&self) -> Option<UserId> {
        self.actor_on_update
    }

    /// Drop both transient actors once a save has consumed them.
    pub(crate) const fn clear_actors(&mut self) {
        self.actor_on_create = None;
        self.actor_on_update = None;
    }

    /// Apply attribute changes in memory.
    pub fn apply_changes(&mut self, changes: ProjectChanges) {
        if let Some(name) = changes.name {
            self.name = name;
        }
        if let Some(description) = changes.description {
            self.description = description;
        }
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn has_member(&self, user_id: UserId) -> bool {
        self.members.iter().any(|member| member.user_id == user_id)
    }

    /// First member held by `user_id`.
    #[must_use]
    pub fn membership_of(&self, user_id: UserId) -> Option<&ProjectMember> {
        self.members.iter().find(|member| member.user_id == user_id)
    }

    #[must_use]
    pub fn member(&self, member_id: MemberId) -> Option<&ProjectMember> {
        self.members.iter().find(|member| member.id == member_id)
    }

    /// Whether any member currently holds an admin-flagged function.
    #[must_use]
    pub fn has_admin(&self) -> bool {
        self.members.iter().any(|member| member.is_admin)
    }

    /// Add `user` with `function`, copying the denormalized fields now.
    ///
    /// Returns `false` and leaves the list alone if the user is already a
    /// member.
    pub fn add_member(&mut self, user: &User, function: &Function) -> bool {
        if self.has_member(user.id) {
            return false;
        }
        let id = self.next_member_id();
        self.members.push(ProjectMember {
            id,
            user_id: user.id,
            user_name: user.login.clone(),
            function_id: function.id,
            function_name: function.name.clone(),
            is_admin: function.is_admin,
        });
        true
    }

    fn next_member_id(&self) -> MemberId {
        MemberId(
            self.members
                .iter()
                .map(|member| member.id.get())
                .max()
                .map_or(1, |max| max + 1),
        )
    }

    /// Check a reassignment batch without touching the member list.
    ///
    /// The admin check only asks whether *some* target function is
    /// admin-flagged; whether the project still has an admin afterwards is
    /// decided by [`Project::validate`] at save time.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason when no target function is admin-flagged
    /// or when member or function ids cannot be resolved.
    pub fn check_reassignment(
        &self,
        assignments: &BTreeMap<MemberId, FunctionId>,
        registry: &BTreeMap<FunctionId, Function>,
    ) -> Result<(), ReassignRejection> {
        let any_admin = assignments
            .values()
            .filter_map(|function_id| registry.get(function_id))
            .any(|function| function.is_admin);
        if !any_admin {
            return Err(ReassignRejection::NoAdminFunction);
        }

        let members: Vec<MemberId> = assignments
            .keys()
            .filter(|member_id| self.member(**member_id).is_none())
            .copied()
            .collect();
        let functions: Vec<FunctionId> = assignments
            .values()
            .filter(|function_id| !registry.contains_key(function_id))
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if members.is_empty() && functions.is_empty() {
            Ok(())
        } else {
            Err(ReassignRejection::UnknownReferences { members, functions })
        }
    }

    /// Point each listed member at its new function. Denormalized fields are
    /// left stale until the next save normalizes them.
    pub fn apply_reassignment(&mut self, assignments: &BTreeMap<MemberId, FunctionId>) {
        for member in &mut self.members {
            if let Some(function_id) = assignments.get(&member.id) {
                member.function_id = *function_id;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Run every save-time invariant in one pass.
    ///
    /// `name_taken` reports whether another project already uses this name;
    /// the caller answers it against storage.
    #[must_use]
    pub fn validate(&self, name_taken: bool) -> ValidationErrors {
        let mut errors = ValidationErrors::new();

        if self.name.trim().is_empty() {
            errors.add(FIELD_NAME, MSG_BLANK);
        } else if name_taken {
            errors.add(FIELD_NAME, MSG_TAKEN);
        }

        if self.members.is_empty() {
            errors.add(FIELD_MEMBERS, MSG_NO_MEMBERS);
        }
        if !self.has_admin() {
            errors.add(FIELD_MEMBERS, MSG_NO_ADMIN);
        }

        let mut seen = HashSet::with_capacity(self.members.len());
        if !self.members.iter().all(|member| seen.insert(member.user_id)) {
            errors.add(FIELD_SAME_MEMBERS, MSG_DUPLICATE_MEMBER);
        }

        errors
    }
}

/// Why a function reassignment was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ReassignRejection {
    /// No target function in the batch is admin-flagged.
    NoAdminFunction,
    /// Some ids in the batch do not resolve.
    UnknownReferences {
        members: Vec<MemberId>,
        functions: Vec<FunctionId>,
    },
    /// The batch passed the precheck but the saved project would break an
    /// invariant, typically by demoting the last admin.
    Invalid { errors: ValidationErrors },
}

impl std::fmt::Display for ReassignRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAdminFunction => f.write_str("no admin function in assignment"),
            Self::UnknownReferences { members, functions } => {
                write!(
                    f,
                    "unknown references: members {members:?}, functions {functions:?}"
                )
            }
            Self::Invalid { errors } => write!(f, "invalid project: {errors}"),
        }
    }
}

/// Result of a reassignment: every pair applied, or none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReassignOutcome {
    Applied,
    Rejected { rejection: ReassignRejection },
}

impl ReassignOutcome {
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    #[must_use]
    pub const fn rejection(&self) -> Option<&ReassignRejection> {
        match self {
            Self::Applied => None,
            Self::Rejected { rejection } => Some(rejection),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, login: &str) -> User {
        User {
            id: UserId(id),
            login: login.to_string(),
        }
    }

    fn function(id: i64, name: &str, is_admin: bool) -> Function {
        Function {
            id: FunctionId(id),
            name: name.to_string(),
            is_admin,
        }
    }

    fn registry() -> BTreeMap<FunctionId, Function> {
        [function(1, "Admin", true), function(2, "Developer", false)]
            .into_iter()
            .map(|f| (f.id, f))
            .collect()
    }

    fn founded() -> Project {
        Project::new_with_admin_member(
            ProjectAttributes::named("apollo"),
            &user(10, "ada"),
            &function(1, "Admin", true),
        )
    }

    #[test]
    fn stale_admin_flag_passes_precheck_but_fails_validation() {
        let mut project = founded();
        project.add_member(&user(11, "bob"), &function(2, "Developer", false));
        let ada = project.membership_of(UserId(10)).expect("ada").id;
        let bob = project.membership_of(UserId(11)).expect("bob").id;

        // the precheck saw Owner flagged as admin; the flag was cleared
        // before the members were normalized
        let mut seen = registry();
        seen.insert(FunctionId(3), function(3, "Owner", true));
        let mut current = seen.clone();
        current.insert(FunctionId(3), function(3, "Owner", false));

        let assignments = BTreeMap::from([(ada, FunctionId(2)), (bob, FunctionId(3))]);
        assert_eq!(project.check_reassignment(&assignments, &seen), Ok(()));

        project.apply_reassignment(&assignments);
        let users = BTreeMap::from([(UserId(10), user(10, "ada")), (UserId(11), user(11, "bob"))]);
        project.members = project
            .members
            .iter()
            .map(|member| {
                normalize_member(member, &current[&member.function_id], &users[&member.user_id])
            })
            .collect();

        assert!(!project.has_admin());
        let errors = project.validate(false);
        assert_eq!(errors.on(FIELD_MEMBERS), [MSG_NO_ADMIN]);
        assert!(!errors.contains(FIELD_NAME));
    }

    #[test]
    fn founded_project_has_one_admin_member_and_is_valid() {
        let project = founded();
        assert!(project.is_new());
        assert_eq!(project.members.len(), 1);
        assert!(project.members[0].is_admin);
        assert_eq!(project.members[0].user_name, "ada");
        assert_eq!(project.actor_on_create(), Some(UserId(10)));
        assert!(project.validate(false).is_empty());
    }

    #[test]
    fn blank_name_is_reported_on_name() {
        let mut project = founded();
        project.name = "   ".into();
        let errors = project.validate(false);
        assert_eq!(errors.on(FIELD_NAME), [MSG_BLANK]);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn taken_name_is_the_only_error() {
        let errors = founded().validate(true);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.on(FIELD_NAME), [MSG_TAKEN]);
    }

    #[test]
    fn empty_member_set_is_invalid() {
        let mut project = founded();
        project.members.clear();
        let errors = project.validate(false);
        assert_eq!(errors.on(FIELD_MEMBERS), [MSG_NO_MEMBERS, MSG_NO_ADMIN]);
    }

    #[test]
    fn members_without_admin_are_invalid() {
        let mut project = founded();
        project.members[0].is_admin = false;
        let errors = project.validate(false);
        assert_eq!(errors.on(FIELD_MEMBERS), [MSG_NO_ADMIN]);
    }

    #[test]
    fn duplicate_user_is_invalid() {
        let mut project = founded();
        let mut twin = project.members[0].clone();
        twin.id = MemberId(2);
        project.members.push(twin);
        let errors = project.validate(false);
        assert_eq!(errors.on(FIELD_SAME_MEMBERS), [MSG_DUPLICATE_MEMBER]);
    }

    #[test]
    fn add_member_is_idempotent_per_user() {
        let mut project = founded();
        let bob = user(11, "bob");
        let dev = function(2, "Developer", false);

        assert!(project.add_member(&bob, &dev));
        assert!(!project.add_member(&bob, &function(1, "Admin", true)));

        assert_eq!(project.members.len(), 2);
        let membership = project.membership_of(bob.id).expect("bob is a member");
        assert_eq!(membership.id, MemberId(2));
        assert_eq!(membership.function_name, "Developer");
        assert!(!membership.is_admin);
        assert!(project.has_member(bob.id));
        assert!(!project.has_member(UserId(99)));
    }

    #[test]
    fn normalize_refreshes_denormalized_fields() {
        let project = founded();
        let renamed = function(1, "Owner", false);
        let refreshed = normalize_member(&project.members[0], &renamed, &user(10, "ada.l"));
        assert_eq!(refreshed.function_name, "Owner");
        assert!(!refreshed.is_admin);
        assert_eq!(refreshed.user_name, "ada.l");
        assert_eq!(refreshed.id, project.members[0].id);
    }

    #[test]
    fn reassignment_needs_an_admin_target() {
        let project = founded();
        let batch = BTreeMap::from([(MemberId(1), FunctionId(2))]);
        assert_eq!(
            project.check_reassignment(&batch, &registry()),
            Err(ReassignRejection::NoAdminFunction)
        );
        assert_eq!(
            project.check_reassignment(&BTreeMap::new(), &registry()),
            Err(ReassignRejection::NoAdminFunction)
        );
    }

    #[test]
    fn reassignment_reports_every_unknown_id() {
        let project = founded();
        let batch = BTreeMap::from([
            (MemberId(1), FunctionId(1)),
            (MemberId(7), FunctionId(9)),
            (MemberId(8), FunctionId(9)),
        ]);
        assert_eq!(
            project.check_reassignment(&batch, &registry()),
            Err(ReassignRejection::UnknownReferences {
                members: vec![MemberId(7), MemberId(8)],
                functions: vec![FunctionId(9)],
            })
        );
    }

    #[test]
    fn apply_reassignment_only_moves_function_ids() {
        let mut project = founded();
        project.add_member(&user(11, "bob"), &function(2, "Developer", false));
        let batch = BTreeMap::from([(MemberId(1), FunctionId(2)), (MemberId(2), FunctionId(1))]);

        assert!(project.check_reassignment(&batch, &registry()).is_ok());
        project.apply_reassignment(&batch);

        assert_eq!(project.members[0].function_id, FunctionId(2));
        assert_eq!(project.members[1].function_id, FunctionId(1));
        // still stale until normalized
        assert!(project.members[0].is_admin);
    }

    #[test]
    fn changes_apply_in_memory() {
        let mut project = founded();
        project.description = Some("old".into());
        project.apply_changes(ProjectChanges {
            name: Some("artemis".into()),
            description: Some(None),
        });
        assert_eq!(project.title(), "artemis");
        assert_eq!(project.description, None);
    }
}
