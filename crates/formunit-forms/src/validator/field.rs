//! Validator wiring for single fields.

use std::sync::Arc;

use formunit_core::FormResult;

use super::{Validatable, ValidatorConfig};
use crate::field::Field;
use crate::unit::FieldValue;

impl<V: FieldValue> Validatable for Field<V> {
    type Input = V;

    fn attach_validator(&self, config: ValidatorConfig<V>) -> FormResult<()> {
        attach(self, config)
    }
}

fn attach<V: FieldValue>(field: &Field<V>, config: ValidatorConfig<V>) -> FormResult<()> {
    let (validator, external) = config.into_parts();
    let strategy = validator.strategy;
    let validator = match external {
        Some(subscribe) => {
            let weak = field.downgrade();
            validator.with_watch(subscribe(Arc::new(move || {
                if let Some(field) = weak.upgrade() {
                    field.revalidate_from_external();
                }
            })))
        }
        None => validator,
    };
    field.install_validator(validator)?;

    tracing::debug!(
        "Validator attached to field '{}' ({strategy:?})",
        field.name()
    );

    if strategy.init {
        field.validate();
    }
    Ok(())
}
