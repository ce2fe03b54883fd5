pub mod image_to_3d;

/// Generic request representation for endpoints
///
/// # Examples
/// ```
/// use splatgate_tasks::EndpointRequest;
/// let request = EndpointRequest::new("model input", 20);
/// assert_eq!(request.inputs, "model input");
/// assert_eq!(*request.parameters(), 20);
/// ```
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Clone)]
pub struct EndpointRequest<I, P> {
    /// Main processing input to feed through the inference engine
    pub inputs: I,

    /// Contains all the parameters to tune the inference engine
    parameters: P,
}

impl<I, P> EndpointRequest<I, P> {
    #[inline]
    pub fn new(inputs: I, parameters: P) -> Self {
        Self { inputs, parameters }
    }

    #[inline]
    pub fn parameters(&self) -> &P {
        &self.parameters
    }

    #[inline]
    pub fn into_parts(self) -> (I, P) {
        (self.inputs, self.parameters)
    }
}
