use mockall::mock;
use p2p_order_engine::{
    db_types::Order,
    traits::{EscrowError, EscrowService},
};

mock! {
    pub Escrow {}
    impl EscrowService for Escrow {
        async fn release(&self, order: &Order) -> Result<String, EscrowError>;
        async fn refund(&self, order: &Order) -> Result<String, EscrowError>;
    }
}
