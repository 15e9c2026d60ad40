use serde::{Deserialize, Serialize};

use super::ids::FunctionId;

/// Name of the role seeded as the default project-admin function.
pub const DEFAULT_ADMIN_NAME: &str = "Admin";
/// Name of the role seeded as the default non-admin function.
pub const DEFAULT_MEMBER_NAME: &str = "Member";

/// A role a member can hold in any project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    /// Holding this role confers project-admin rights.
    pub is_admin: bool,
}

/// A user as far as the project aggregate cares: an id and a login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: super::ids::UserId,
    pub login: String,
}
