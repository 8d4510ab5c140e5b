use anyhow::Result;
use geo::{Contains, Coord, Geometry, LineString, MultiPolygon, Polygon};
use hashbrown::{HashMap, HashSet};
use osmpbfreader::{NodeId, OsmObj, OsmPbfReader, RelationId, Tags, Way, WayId};
use sled::Db;
use std::io::{Read, Seek};
use tempfile::{Builder, TempDir};
use tracing::info;

/// Builds lon/lat geometries for the ways and relations of an extract
pub struct GeometryResolver {
    node_db: Db,
    // sled lives in here; the directory goes away with the resolver
    _node_dir: TempDir,
    way_nodes: HashMap<WayId, Vec<NodeId>>,
    relation_members: HashMap<RelationId, RelationRings>,
}

/// Member ways of a multipolygon relation by role
#[derive(Debug, Default)]
struct RelationRings {
    outer: Vec<WayId>,
    inner: Vec<WayId>,
}

impl GeometryResolver {
    /// Build the resolver by scanning the file
    pub fn build<R: Read + Seek, F>(reader: &mut OsmPbfReader<R>, filter: F) -> Result<Self>
    where
        F: Fn(&Tags) -> bool,
    {
        info!("Building geometry index...");

        let mut needed_ways = HashSet::new();
        let mut needed_nodes = HashSet::new();
        let mut relation_members_map = HashMap::new();
        let mut way_nodes_map = HashMap::new();

        // Pass 1: relations whose member ways we need
        info!("Pass 1/3: Identifying relevant relations...");
        reader.rewind()?;
        for obj in reader.iter() {
            if let OsmObj::Relation(rel) = obj? {
                if filter(&rel.tags) {
                    let mut rings = RelationRings::default();
                    for m in &rel.refs {
                        let Some(way_id) = m.member.way() else {
                            continue;
                        };
                        match m.role.as_str() {
                            "outer" | "" => rings.outer.push(way_id),
                            "inner" => rings.inner.push(way_id),
                            _ => continue,
                        }
                        needed_ways.insert(way_id);
                    }
                    relation_members_map.insert(rel.id, rings);
                }
            }
        }
        info!("Found {} relevant relations", relation_members_map.len());

        // Pass 2: ways, either tagged themselves or members of a relation
        info!("Pass 2/3: Identifying relevant ways...");
        reader.rewind()?;
        for obj in reader.iter() {
            if let OsmObj::Way(way) = obj? {
                if needed_ways.contains(&way.id) || filter(&way.tags) {
                    needed_ways.insert(way.id);
                    needed_nodes.extend(way.nodes.iter().copied());
                    way_nodes_map.insert(way.id, way.nodes);
                }
            }
        }
        info!(
            "Found {} relevant ways, referencing {} nodes",
            needed_ways.len(),
            needed_nodes.len()
        );

        // Pass 3: node coordinates
        info!("Pass 3/3: Storing node coordinates...");
        reader.rewind()?;

        let node_dir = Builder::new().prefix("placemark-nodes-").tempdir()?;
        let db = sled::open(node_dir.path())?;

        let mut stored_count = 0;
        for obj in reader.iter() {
            if let OsmObj::Node(node) = obj? {
                if needed_nodes.contains(&node.id) {
                    let mut value = [0u8; 16];
                    value[0..8].copy_from_slice(&node.lon().to_be_bytes());
                    value[8..16].copy_from_slice(&node.lat().to_be_bytes());
                    db.insert(node.id.0.to_be_bytes(), &value)?;
                    stored_count += 1;
                }
            }
        }

        db.flush()?;
        info!("Stored {} node coordinates", stored_count);

        Ok(Self {
            node_db: db,
            _node_dir: node_dir,
            way_nodes: way_nodes_map,
            relation_members: relation_members_map,
        })
    }

    fn node_coord(&self, id: NodeId) -> Option<Coord<f64>> {
        let bytes = self.node_db.get(id.0.to_be_bytes()).ok()??;
        let lon = f64::from_be_bytes(bytes.get(0..8)?.try_into().ok()?);
        let lat = f64::from_be_bytes(bytes.get(8..16)?.try_into().ok()?);
        Some(Coord { x: lon, y: lat })
    }

    fn way_coords(&self, id: WayId) -> Option<Vec<Coord<f64>>> {
        let nodes = self.way_nodes.get(&id)?;
        let coords: Vec<Coord<f64>> = nodes.iter().filter_map(|n| self.node_coord(*n)).collect();
        (coords.len() >= 2).then_some(coords)
    }

    /// Areas become polygons, everything else a line
    pub fn resolve_way(&self, way: &Way) -> Option<Geometry<f64>> {
        let coords = self.way_coords(way.id)?;
        let closed = coords.len() >= 4 && coords.first() == coords.last();
        if closed && is_area(&way.tags) {
            Some(Polygon::new(LineString::new(coords), vec![]).into())
        } else {
            Some(LineString::new(coords).into())
        }
    }

    /// Polygons of a multipolygon relation, inner rings cut out as holes
    pub fn resolve_relation(&self, rel_id: RelationId) -> Option<MultiPolygon<f64>> {
        let members = self.relation_members.get(&rel_id)?;
        let rings = |ways: &[WayId]| -> Vec<Vec<Coord<f64>>> {
            ways.iter().filter_map(|way_id| self.way_coords(*way_id)).collect()
        };

        let polygons = assemble_polygons(rings(&members.outer), rings(&members.inner));
        if polygons.is_empty() {
            return None;
        }
        Some(MultiPolygon::new(polygons))
    }
}

/// Closed ways are areas unless they are linear features drawn as a loop
pub fn is_area(tags: &Tags) -> bool {
    if tags.contains("area", "yes") {
        return true;
    }
    if tags.contains("area", "no") {
        return false;
    }
    !(tags.contains_key("highway") || tags.contains_key("barrier") || tags.contains_key("railway"))
}

/// Join way segments that share endpoints into closed rings
pub fn merge_rings_to_polygons(rings: Vec<Vec<Coord<f64>>>) -> Vec<Polygon<f64>> {
    let mut result = Vec::new();
    let mut remaining = rings;

    while !remaining.is_empty() {
        let mut current = remaining.remove(0);

        let mut merged = current.first() != current.last();
        while merged && !remaining.is_empty() {
            merged = false;
            let start = current.first().copied();
            let end = current.last().copied();

            let touches = |r: &Vec<Coord<f64>>| {
                let (first, last) = (r.first().copied(), r.last().copied());
                first == end || last == end || first == start || last == start
            };
            let Some(i) = remaining.iter().position(touches) else {
                break;
            };

            let mut ring = remaining.remove(i);
            if ring.first().copied() == end {
                ring.remove(0);
                current.extend(ring);
            } else if ring.last().copied() == end {
                ring.reverse();
                ring.remove(0);
                current.extend(ring);
            } else if ring.last().copied() == start {
                ring.pop();
                ring.extend(current);
                current = ring;
            } else {
                ring.reverse();
                ring.pop();
                ring.extend(current);
                current = ring;
            }
            merged = current.first() != current.last();
        }

        // Only rings that actually closed are kept
        if current.len() >= 4 && current.first() == current.last() {
            result.push(Polygon::new(LineString::new(current), vec![]));
        }
    }

    result
}

/// Merge outer and inner segments, then put every inner ring into the
/// outer polygon that contains it. Inner rings outside every shell are dropped.
pub fn assemble_polygons(
    outer: Vec<Vec<Coord<f64>>>,
    inner: Vec<Vec<Coord<f64>>>,
) -> Vec<Polygon<f64>> {
    let mut polygons = merge_rings_to_polygons(outer);
    for hole in merge_rings_to_polygons(inner) {
        let ring = hole.exterior();
        if let Some(shell) = polygons.iter_mut().find(|p| p.contains(ring)) {
            shell.interiors_push(ring.clone());
        }
    }
    polygons
}
