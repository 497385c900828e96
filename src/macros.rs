#[cfg(all(feature = "defmt", feature = "log"))]
compile_error!("You may not enable both `defmt` and `log` features.");

#[cfg(feature = "log")]
#[macro_use]
mod log {
    macro_rules! card_log {
        (trace, $($arg:expr),*) => { log::trace!($($arg),*); };
        (debug, $($arg:expr),*) => { log::debug!($($arg),*); };
    }
}

#[cfg(feature = "defmt")]
#[macro_use]
mod log {
    macro_rules! card_log {
        (trace, $($arg:expr),*) => { ::defmt::trace!($($arg),*); };
        (debug, $($arg:expr),*) => { ::defmt::debug!($($arg),*); };
    }
}

#[cfg(all(not(feature = "log"), not(feature = "defmt")))]
#[macro_use]
mod log {
    macro_rules! card_log {
        ($level:ident, $($arg:expr),*) => { $( let _ = $arg; )* }
    }
}

macro_rules! card_trace {
    ($($arg:expr),*) => (card_log!(trace, $($arg),*));
}

macro_rules! card_debug {
    ($($arg:expr),*) => (card_log!(debug, $($arg),*));
}
