use crate::lifecycle::Bookings;

#[derive(Clone)]
pub struct AppState {
    pub bookings: Bookings,
    pub env_name: String,
}
