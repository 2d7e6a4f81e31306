use dbus_crossroads::{IfaceBuilder, IfaceToken};
use log::info;

use super::{common, constants::LE_ADVERTISEMENT_IFACE};
use crate::peripheral::advertisement::Advertisement;

/// What the exported `LEAdvertisement1` object answers with.
#[derive(Debug, Clone)]
pub struct AdvertisementData {
    kind: String,
    local_name: String,
    uuids: Vec<String>,
}

impl From<&Advertisement> for AdvertisementData {
    fn from(advertisement: &Advertisement) -> Self {
        AdvertisementData {
            kind: advertisement.kind.to_owned(),
            local_name: advertisement.local_name.clone().unwrap_or_else(String::new),
            uuids: advertisement
                .service_uuids()
                .iter()
                .map(|uuid| uuid.to_string())
                .collect(),
        }
    }
}

pub fn register_iface(tree: &mut common::Tree) -> IfaceToken<AdvertisementData> {
    tree.register(LE_ADVERTISEMENT_IFACE, |b: &mut IfaceBuilder<AdvertisementData>| {
        b.method("Release", (), (), |ctx, _advertisement, ()| {
            info!("Advertisement {} released", ctx.path());
            Ok(())
        });
        b.property("Type")
            .get(|_ctx, advertisement| Ok(advertisement.kind.clone()));
        b.property("LocalName")
            .get(|_ctx, advertisement| Ok(advertisement.local_name.clone()));
        b.property("ServiceUUIDs")
            .get(|_ctx, advertisement| Ok(advertisement.uuids.clone()));
    })
}
