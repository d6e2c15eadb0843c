//! Validator wiring for field lists.
//!
//! Both list facades share one core, so attaching to either goes through
//! the same path. The validator receives a [`ListItem`] per slot.

use std::sync::Arc;

use formunit_core::FormResult;

use super::{ListItem, Validatable, ValidatorConfig};
use crate::controlled_field_list::ControlledFieldList;
use crate::field_list::FieldList;
use crate::field_list_core::FieldListCore;
use crate::unit::FieldValue;

impl<V: FieldValue> Validatable for FieldList<V> {
    type Input = ListItem<V>;

    fn attach_validator(&self, config: ValidatorConfig<ListItem<V>>) -> FormResult<()> {
        attach(self, config)
    }
}

impl<V: FieldValue> Validatable for ControlledFieldList<V> {
    type Input = ListItem<V>;

    fn attach_validator(&self, config: ValidatorConfig<ListItem<V>>) -> FormResult<()> {
        attach(self, config)
    }
}

fn attach<V: FieldValue>(core: &FieldListCore<V>, config: ValidatorConfig<ListItem<V>>) -> FormResult<()> {
    let (validator, external) = config.into_parts();
    let strategy = validator.strategy;
    let validator = match external {
        Some(subscribe) => {
            let weak = core.downgrade();
            validator.with_watch(subscribe(Arc::new(move || {
                if let Some(core) = weak.upgrade() {
                    core.revalidate_from_external();
                }
            })))
        }
        None => validator,
    };
    core.install_validator(validator)?;

    tracing::debug!(
        "Validator attached to field list '{}' ({strategy:?})",
        core.name()
    );

    if strategy.init {
        core.validate();
    }
    Ok(())
}
