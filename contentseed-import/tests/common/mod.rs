#![allow(dead_code)]

use chrono::{DateTime, Utc};
use contentseed_import::{ContentCreator, ImportResult};
use contentseed_types::{AccessControlEntry, PrincipalDefinition, PropertyValue};

/// One structural event as seen by [`Recorder`].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Node {
        name: Option<String>,
        primary_type: Option<String>,
        mixins: Vec<String>,
    },
    Finish,
    Property(String, PropertyValue),
    File(String, Vec<u8>),
    Switch(String),
    Principal(PrincipalDefinition),
    Ace(AccessControlEntry),
}

/// A creator that records events and never touches a store.
#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Vec<Event>,
}

impl Recorder {
    pub fn files(&self) -> Vec<(&str, &[u8])> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::File(name, data) => Some((name.as_str(), data.as_slice())),
                _ => None,
            })
            .collect()
    }
}

impl ContentCreator for Recorder {
    fn create_node(
        &mut self,
        name: Option<&str>,
        primary_type: Option<&str>,
        mixins: &[String],
    ) -> ImportResult<()> {
        self.events.push(Event::Node {
            name: name.map(str::to_string),
            primary_type: primary_type.map(str::to_string),
            mixins: mixins.to_vec(),
        });
        Ok(())
    }

    fn finish_node(&mut self) -> ImportResult<()> {
        self.events.push(Event::Finish);
        Ok(())
    }

    fn create_property(&mut self, name: &str, value: PropertyValue) -> ImportResult<()> {
        self.events.push(Event::Property(name.to_string(), value));
        Ok(())
    }

    fn create_file(
        &mut self,
        name: &str,
        data: &[u8],
        _mime_type: Option<&str>,
        _last_modified: Option<DateTime<Utc>>,
    ) -> ImportResult<()> {
        self.events.push(Event::File(name.to_string(), data.to_vec()));
        Ok(())
    }

    fn switch_current_node(&mut self, sub_path: &str, _folder_type: &str) -> ImportResult<()> {
        self.events.push(Event::Switch(sub_path.to_string()));
        Ok(())
    }

    fn create_principal(&mut self, principal: PrincipalDefinition) -> ImportResult<()> {
        self.events.push(Event::Principal(principal));
        Ok(())
    }

    fn create_ace(&mut self, ace: AccessControlEntry) -> ImportResult<()> {
        self.events.push(Event::Ace(ace));
        Ok(())
    }

    fn import_nested(&mut self, _name: &str, _data: &[u8]) -> ImportResult<bool> {
        Ok(false)
    }
}
