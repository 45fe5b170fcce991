//! A discovery device: spanning tree plus service-discovery automaton.

use tracing::warn;

use crate::config::ProtocolConfig;
use crate::discovery::{Automaton, AutomatonExport, Phase, ServiceProfile, TreeView};
use crate::error::ProtocolError;
use crate::neighborhood::Neighborhood;
use crate::network::Program;
use crate::render::{Color, Render, Shape};
use crate::tree::{tree_round, ParentPointer, SubtreeSet, TreeExport};
use crate::types::{DeviceId, Round};

/// Everything a discovery device announces in one round.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceExport {
    pub tree: TreeExport,
    pub procs: AutomatonExport,
}

pub struct Device {
    id: DeviceId,
    config: ProtocolConfig,
    automaton: Automaton,
    tree: TreeExport,
    render: Render,
}

impl Device {
    pub fn new(
        id: DeviceId,
        config: ProtocolConfig,
        profile: ServiceProfile,
    ) -> Result<Self, ProtocolError> {
        config.validate()?;
        let tree = TreeExport {
            pointer: if id == config.root {
                ParentPointer::root(id)
            } else {
                ParentPointer::detached(id)
            },
            subtree: SubtreeSet::singleton(id, config.subtree)?,
        };
        Ok(Self {
            id,
            automaton: Automaton::new(id, config.clone(), profile),
            config,
            tree,
            render: Render::default(),
        })
    }

    pub fn automaton(&self) -> &Automaton {
        &self.automaton
    }

    pub fn phase(&self) -> Phase {
        self.automaton.phase()
    }

    /// Tree state computed in the last round.
    pub fn tree(&self) -> &TreeExport {
        &self.tree
    }

    pub fn render(&self) -> &Render {
        &self.render
    }

    fn paint(&mut self) {
        let active = self.automaton.active_processes();
        let mut render = Render {
            node: match self.phase() {
                Phase::Idle if active > 0 => Color::GREEN,
                Phase::Idle => Color::WHITE,
                Phase::Disco => Color::BLUE,
                Phase::Offer => Color::RED,
                Phase::Served => Color::SALMON,
                Phase::Serving => Color::BROWN,
            },
            shape: if self.automaton.is_requester() {
                Shape::Cube
            } else {
                Shape::Sphere
            },
            size: 10.0 * 1.2_f64.powi(active.min(10) as i32),
            ..Render::default()
        };
        for (slot, tokens) in self.automaton.managers() {
            if let (Some(slot), Some(color)) = (slot, tokens.first()) {
                render.paint(slot, *color);
            }
        }
        self.render = render;
    }
}

impl Program for Device {
    type Export = DeviceExport;

    fn id(&self) -> DeviceId {
        self.id
    }

    fn round(&mut self, now: Round, nbrs: &Neighborhood<'_, DeviceExport>) -> DeviceExport {
        let is_root = self.id == self.config.root;
        match tree_round(
            is_root,
            self.config.radius,
            self.config.max_tree_distance(),
            &self.config.flex,
            self.config.subtree,
            &nbrs.map(|e| &e.tree),
        ) {
            Ok(tree) => self.tree = tree,
            // Keeps last round's tree.
            Err(err) => warn!(device = %self.id, %err, "tree round failed"),
        }

        let view = TreeView {
            parent: self.tree.pointer.parent,
            subtree: &self.tree.subtree,
        };
        let procs = self.automaton.round(now, view, &nbrs.map(|e| &e.procs));
        self.paint();

        DeviceExport {
            tree: self.tree.clone(),
            procs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ServiceType;

    #[test]
    fn lone_root_is_its_own_parent() {
        let mut d = Device::new(DeviceId(0), ProtocolConfig::default(), ServiceProfile::default())
            .unwrap();
        let export = d.round(1, &Neighborhood::isolated(DeviceId(0), 1.0));
        assert_eq!(export.tree.pointer, ParentPointer::root(DeviceId(0)));
        assert_eq!(d.render().node, Color::WHITE);
        assert_eq!(d.render().shape, Shape::Sphere);
    }

    #[test]
    fn lone_device_stays_detached() {
        let mut d = Device::new(DeviceId(4), ProtocolConfig::default(), ServiceProfile::default())
            .unwrap();
        let export = d.round(1, &Neighborhood::isolated(DeviceId(4), 1.0));
        assert!(!export.tree.pointer.is_attached());
        assert_eq!(export.tree.pointer.parent, DeviceId(4));
    }

    #[test]
    fn requester_renders_as_blue_cube() {
        let profile = ServiceProfile::requesting(ServiceType(5), 0);
        let mut d = Device::new(DeviceId(4), ProtocolConfig::default(), profile).unwrap();
        d.round(1, &Neighborhood::isolated(DeviceId(4), 1.0));
        assert_eq!(d.phase(), Phase::Disco);
        assert_eq!(d.render().node, Color::BLUE);
        assert_eq!(d.render().shape, Shape::Cube);
        assert!(d.render().size > 10.0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ProtocolConfig {
            radius: 0.0,
            ..ProtocolConfig::default()
        };
        assert!(Device::new(DeviceId(0), config, ServiceProfile::default()).is_err());
    }
}
