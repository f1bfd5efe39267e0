// Order sizing, collaborator access and the position state machine
pub mod order_sizer;
pub mod position_manager;
pub mod services;

pub use order_sizer::{floor_to_step, OrderSizer, Sizing, SizingRejection};
pub use position_manager::{
    ControllerConfig, PositionController, SkipReason, StepOutcome, TradeState,
};
pub use services::Services;
