pub mod admin;
pub mod checkout;
pub mod gateways;
pub mod metrics;
pub mod notifications;
pub mod pricing;
pub mod reconciliation;
pub mod registration_writer;
pub mod store;
pub mod team_resolver;

pub use admin::AdminService;
pub use checkout::CheckoutService;
pub use gateways::{GatewayRegistry, PaymentGateway, PhonePeGateway, RazorpayGateway};
pub use self::metrics::{get_metrics, init_metrics};
pub use notifications::{EmailProvider, MockEmailProvider, NotificationDispatcher, SmtpProvider};
pub use reconciliation::{ReconcileOutcome, ReconcileState, ReconcileTrigger, Reconciler};
pub use registration_writer::RegistrationWriter;
pub use store::{InMemoryStore, PgStore, RegistrationStore};
pub use team_resolver::TeamResolver;
