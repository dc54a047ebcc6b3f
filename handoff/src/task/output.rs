/// What a task body may return.
///
/// `()` means the body cannot fail. A `Result` sends its error through the
/// outcome's error slot, converted into an [`anyhow::Error`].
pub trait TaskOutput: Send + 'static {
    type Value: Send + 'static;

    fn into_result(self) -> anyhow::Result<Self::Value>;
}

impl TaskOutput for () {
    type Value = ();

    fn into_result(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<T, E> TaskOutput for Result<T, E>
where
    T: Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
{
    type Value = T;

    fn into_result(self) -> anyhow::Result<T> {
        self.map_err(Into::into)
    }
}
