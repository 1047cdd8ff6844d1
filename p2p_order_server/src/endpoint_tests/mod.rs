mod helpers;
mod mempool;
mod mocks;
mod orders;
