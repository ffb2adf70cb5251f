use byki_migrate::{migrate::ProgressSink, CollectionName};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

/// A progress bar per collection, advanced as batches commit.
pub struct BatchBar {
    style: ProgressStyle,
    current: Mutex<Option<ProgressBar>>,
}

impl BatchBar {
    pub fn new(template: Option<&str>) -> Self {
        let style = ProgressStyle::with_template(template.unwrap_or("{msg}: {bar} ({pos}/{len})"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        BatchBar {
            style,
            current: Mutex::new(None),
        }
    }
}

impl ProgressSink for BatchBar {
    fn collection_started(&self, collection: CollectionName, records: usize) {
        let bar = ProgressBar::new(records as u64)
            .with_style(self.style.clone())
            .with_message(collection.as_str());
        if let Some(old) = self.current.lock().unwrap().replace(bar) {
            old.finish_and_clear();
        }
    }

    fn batch_committed(&self, _collection: CollectionName, records: usize) {
        if let Some(bar) = self.current.lock().unwrap().as_ref() {
            bar.inc(records as u64);
        }
    }

    fn collection_finished(&self, _collection: CollectionName) {
        if let Some(bar) = self.current.lock().unwrap().take() {
            bar.finish_and_clear();
        }
    }
}
