use crate::{jwt::SessionData, schema::UserRole};

const ACTION_TABLE: &[(UserRole, &[ActionType])] = &[
    (
        UserRole::User,
        &[
            ActionType::ManageOwnRecipes,
            ActionType::ManageOwnFavorites,
            ActionType::ManageOwnCart,
            ActionType::ManageOwnSubscriptions,
        ],
    ),
    (
        UserRole::Admin,
        &[
            ActionType::ManageOwnRecipes,
            ActionType::ManageOwnFavorites,
            ActionType::ManageOwnCart,
            ActionType::ManageOwnSubscriptions,
            ActionType::ManageAllRecipes,
            ActionType::ManageCatalog,
        ],
    ),
];

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActionType {
    ManageOwnRecipes,
    ManageOwnFavorites,
    ManageOwnCart,
    ManageOwnSubscriptions,

    ManageAllRecipes,
    ManageCatalog,
}

impl ActionType {
    pub fn authenticate(self, session: &SessionData) -> bool {
        ACTION_TABLE
            .iter()
            .find_map(|(role, actions)| {
                if &session.role != role {
                    return None;
                }

                Some(actions.contains(&self))
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn session(user_id: i32, role: UserRole) -> SessionData {
        SessionData {
            user_id,
            username: String::from("cook"),
            role,
        }
    }

    #[rstest]
    #[case(UserRole::User, ActionType::ManageOwnFavorites, true)]
    #[case(UserRole::User, ActionType::ManageOwnSubscriptions, true)]
    #[case(UserRole::User, ActionType::ManageAllRecipes, false)]
    #[case(UserRole::User, ActionType::ManageCatalog, false)]
    #[case(UserRole::Admin, ActionType::ManageAllRecipes, true)]
    #[case(UserRole::Admin, ActionType::ManageCatalog, true)]
    fn table_lookup(#[case] role: UserRole, #[case] action: ActionType, #[case] allowed: bool) {
        assert_eq!(action.authenticate(&session(1, role)), allowed);
    }

    #[test]
    fn authors_manage_their_own_recipes() {
        let s = session(1, UserRole::User);
        assert!(s
            .authenticate_owner(1, ActionType::ManageOwnRecipes, ActionType::ManageAllRecipes)
            .is_ok());
    }

    #[test]
    fn others_are_forbidden() {
        let s = session(2, UserRole::User);
        let err = s
            .authenticate_owner(1, ActionType::ManageOwnRecipes, ActionType::ManageAllRecipes)
            .unwrap_err();
        assert_eq!(err.kind, crate::error::HtmlError::Forbidden);
    }

    #[test]
    fn admins_manage_every_recipe() {
        let s = session(2, UserRole::Admin);
        assert!(s
            .authenticate_owner(1, ActionType::ManageOwnRecipes, ActionType::ManageAllRecipes)
            .is_ok());
    }
}
