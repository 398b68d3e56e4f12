//! Domain definitions.

pub mod franchise;
pub mod notification;
pub mod order;
pub mod payment;
pub mod product;
pub mod service_request;
pub mod subscription;
pub mod user;

pub use self::{
    franchise::Franchise, notification::Notification, order::Order,
    payment::Payment, product::Product, service_request::ServiceRequest,
    subscription::Subscription, user::User,
};
