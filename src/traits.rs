pub trait TryConvert<From, To> {
    type Error;

    fn try_convert(&self, f: From) -> Result<To, Self::Error>;
}

/// Progress indicator
pub trait Progress {
    fn inc(&self, i: u64);

    fn finish(&self);
}
