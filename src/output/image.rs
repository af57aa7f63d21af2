//! Image allocation and spatial metadata on actor outputs.

use crate::container::DataItemContainer;
use crate::error::OutputResult;
use crate::image::ImageProperties;
use crate::selector::{IntoSelector, RunIndex};

use super::ActorOutput;

impl ActorOutput {
    /// Allocate the images of `run`, creating the run's container if needed.
    ///
    /// Existing data of the run is replaced by `fill_value`. A new container
    /// counts as one sample.
    ///
    /// # Errors
    /// Fatal for engine-owned outputs; `RunFinalized`, `DataReleased`.
    pub fn create_empty_image(&mut self, run: RunIndex, properties: ImageProperties, fill_value: f64) -> OutputResult<()> {
        self.ensure_not_engine_owned("create_empty_image")?;
        self.ensure_in_memory()?;
        self.ensure_open_run(run)?;

        let owner = self.key.clone();
        let write_config = self.write_config.clone();
        let kind = self.kind;
        let container = self.data_per_run.entry(run).or_insert_with(|| {
            let mut container = DataItemContainer::new(kind);
            container.set_owner(owner);
            container.set_write_config(write_config);
            container.set_number_of_samples(1);
            container
        });
        container.create_empty_image(properties, fill_value)?;
        Ok(())
    }

    /// Set spacing and/or origin on the images addressed by `which`.
    ///
    /// Containers that are still empty are skipped.
    ///
    /// # Errors
    /// Fatal for invalid selectors; `RunNotFound`/`NoMergedData` for a
    /// single missing target.
    pub fn set_image_properties(
        &mut self,
        which: impl IntoSelector,
        spacing: Option<[f64; 3]>,
        origin: Option<[f64; 3]>,
    ) -> OutputResult<()> {
        let selector = self.selector(which, "set_image_properties")?;
        for container in self.collect_data_mut(selector)? {
            container.set_image_properties(spacing, origin);
        }
        Ok(())
    }

    /// Spatial metadata of the images addressed by `which`, in collection
    /// order. Empty containers are skipped.
    ///
    /// # Errors
    /// See [`collect_data`](Self::collect_data).
    pub fn get_image_properties(&self, which: impl IntoSelector) -> OutputResult<Vec<ImageProperties>> {
        Ok(self
            .collect_data(which)?
            .into_iter()
            .filter_map(DataItemContainer::image_properties)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::container::ContainerRegistry;
    use crate::output::ActorOutputConfig;
    use crate::path::OutputDirectory;

    use super::*;

    fn props() -> ImageProperties {
        ImageProperties {
            size: [2, 2, 1],
            spacing: [1.0; 3],
            origin: [0.0; 3],
        }
    }

    fn output(class: &str) -> ActorOutput {
        ActorOutput::image(
            ActorOutputConfig::new("edep", "dose")
                .data_container_class(class)
                .keep_data_per_run(true),
            &ContainerRegistry::with_defaults(),
            Arc::new(OutputDirectory::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_create_empty_image_allocates_every_slot() {
        let mut out = output("QuotientImage");
        out.create_empty_image(0, props(), 0.0).unwrap();
        let c = out.get_container(0).unwrap();
        assert_eq!(c.item().slot(0).unwrap().values(), &[0.0; 4]);
        assert_eq!(c.item().slot(1).unwrap().values(), &[0.0; 4]);
        assert!(c.owner().is_some());
        assert_eq!(c.number_of_samples(), 1);
    }

    #[test]
    fn test_image_properties_across_runs() {
        let mut out = output("SingleImage");
        out.create_empty_image(0, props(), 0.0).unwrap();
        out.create_empty_image(1, props(), 1.0).unwrap();
        out.set_image_properties("all", Some([2.0; 3]), Some([-5.0, 0.0, 0.0]))
            .unwrap();

        let all = out.get_image_properties("all_runs").unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|p| p.spacing == [2.0; 3] && p.origin == [-5.0, 0.0, 0.0]));
    }

    #[test]
    fn test_set_image_properties_on_missing_run() {
        let mut out = output("SingleImage");
        let err = out.set_image_properties(3, Some([2.0; 3]), None).unwrap_err();
        assert!(err.is_state());
    }

    #[test]
    fn test_create_empty_image_after_end_of_run() {
        let mut out = output("SingleImage");
        out.end_of_run(0).unwrap();
        assert!(out.create_empty_image(0, props(), 0.0).is_err());
    }
}
