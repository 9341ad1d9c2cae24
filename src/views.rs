use crate::models::user::Role;

/// Screens of the dashboard and who may open them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    DeliveryList,
    DeliveryDetail,
    CreateDelivery,
    MyConciliations,
    Conciliations,
}

impl View {
    pub const ALL: [View; 5] = [
        View::DeliveryList,
        View::DeliveryDetail,
        View::CreateDelivery,
        View::MyConciliations,
        View::Conciliations,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            View::DeliveryList => "/deliveries",
            View::DeliveryDetail => "/delivery/:id",
            View::CreateDelivery => "/create-delivery",
            View::MyConciliations => "/my-conciliations",
            View::Conciliations => "/conciliations",
        }
    }

    /// `None` means any authenticated user.
    pub fn required_role(&self) -> Option<Role> {
        match self {
            View::DeliveryList | View::DeliveryDetail => None,
            View::CreateDelivery | View::Conciliations => Some(Role::Moderator),
            View::MyConciliations => Some(Role::Delivery),
        }
    }

    pub fn permits(&self, role: Role) -> bool {
        self.required_role().is_none_or(|required| required == role)
    }

    pub fn from_path(path: &str) -> Option<View> {
        let path = path.trim_end_matches('/');
        if let Some(id) = path.strip_prefix("/delivery/") {
            return id.parse::<u64>().ok().map(|_| View::DeliveryDetail);
        }

        Self::ALL
            .into_iter()
            .find(|view| view != &View::DeliveryDetail && view.path() == path)
    }

    /// Views listed in the navigation for `role`.
    pub fn navigation(role: Role) -> Vec<View> {
        Self::ALL
            .into_iter()
            .filter(|view| *view != View::DeliveryDetail && view.permits(role))
            .collect()
    }
}
