//! Aggregates module
pub mod dashboard;
pub mod order;
pub mod payment;
pub mod product;
pub mod subscription;
pub mod user;

pub use dashboard::{CategoryProductCount, Dashboard, RECENT_ORDERS};
pub use order::{LinePayment, LineRequest, NewOrder, NewOrderItem, Order, OrderFilter, OrderItem, PlaceOrder, UpdateOrder};
pub use payment::{
    NewPayment, Payment, PaymentFilter, PaystackEvent, PaystackEventFilter, PaystackPayment, PaystackPaymentFilter, UpdatePayment,
    PAYSTACK_PENDING, PAYSTACK_SUCCESS,
};
pub use product::{Category, CategoryFilter, NewCategory, NewProduct, NewStem, Product, ProductFilter, ProductStem, UpdateCategory, UpdateProduct};
pub use subscription::{
    NewSubscription, NewSubscriptionDelivery, NewUserSubscription, Subscription, SubscriptionDelivery, SubscriptionFilter,
    UpdateSubscription, UpdateSubscriptionDelivery, UpdateUserSubscription, UserSubscription, UserSubscriptionFilter,
};
pub use user::{NewUser, UpdateUser, User, UserFilter};
