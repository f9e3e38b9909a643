//! Runtime retargeting of existing calls

use crate::call::Call;
use crate::provider::Provider;
use crate::types::CallParams;

/// A copy of `call` with the given fields replaced
///
/// The original call is left untouched. Fields passed as `None` keep their
/// current value, including the call params when only the provider
/// changes, since they are expressed in provider-neutral terms.
pub fn override_call<A>(
    call: &Call<A>,
    provider: Option<Provider>,
    model: Option<&str>,
    call_params: Option<CallParams>,
) -> Call<A> {
    let overridden = call.with_target(provider, model, call_params);
    tracing::debug!(
        from_provider = %call.provider(),
        from_model = %call.model(),
        provider = %overridden.provider(),
        model = %overridden.model(),
        "call overridden"
    );
    overridden
}
