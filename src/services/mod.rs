pub mod authorization;
pub mod bank;
pub mod merchant;
pub mod notifier;
pub mod reconciler;
pub mod switch;

pub use authorization::{ApproveAll, AuthorizationDecision, Authorizer, DeclineAll};
pub use bank::{BankService, BankSettings};
pub use merchant::{MerchantService, MerchantSettings};
pub use notifier::{deliver_pending, DeliveryOutcome};
pub use reconciler::{run_reconciler, Reconcilable};
pub use switch::{MerchantRegistry, SwitchService, SwitchSettings};
