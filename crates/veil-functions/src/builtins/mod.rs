//! Function modules registered into every catalog built with
//! [`FunctionCatalog::with_builtins`](crate::FunctionCatalog::with_builtins).

mod base;
mod dates;
mod lipsum;
mod net;
mod random;
mod sample;
mod text;

use crate::catalog::FunctionCatalog;

pub fn register_all(catalog: &mut FunctionCatalog) {
    base::register(catalog);
    text::register(catalog);
    random::register(catalog);
    dates::register(catalog);
    net::register(catalog);
    lipsum::register(catalog);
    sample::register(catalog);
}
