//! Reentrancy flag kept in instance storage.
//!
//! Every mutating entry point calls [`enter`] first and [`exit`] on the way
//! out. A failed invocation is rolled back by the host, flag included.

use soroban_sdk::{symbol_short, Env, Symbol};

use crate::Error;

const LOCKED: Symbol = symbol_short!("LOCKED");

pub fn enter(env: &Env) -> Result<(), Error> {
    let storage = env.storage().instance();
    if storage.get::<_, bool>(&LOCKED).unwrap_or(false) {
        return Err(Error::Reentrant);
    }
    storage.set(&LOCKED, &true);
    Ok(())
}

pub fn exit(env: &Env) {
    env.storage().instance().remove(&LOCKED);
}

pub fn is_locked(env: &Env) -> bool {
    env.storage().instance().get::<_, bool>(&LOCKED).unwrap_or(false)
}
