//! OME-XML image descriptions.

use itertools::Itertools;

use super::ChannelLabel;

const OME_NAMESPACE: &str = "http://www.openmicroscopy.org/Schemas/OME/2016-06";

/// Escape `value` for use in an XML attribute.
#[must_use]
pub fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for character in value.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            character => escaped.push(character),
        }
    }
    escaped
}

/// The OME-XML description of an 8-bit `(c, y, x)` image stored one page per channel.
///
/// Channel `i` is stored in the `i`-th page of the main page chain.
#[must_use]
pub fn ome_xml(labels: &[ChannelLabel], shape: [usize; 3], pixel_size: f64) -> String {
    let [size_c, size_y, size_x] = shape;
    let channels = labels
        .iter()
        .enumerate()
        .map(|(index, label)| {
            format!(
                r#"<Channel ID="Channel:0:{index}" Name="{}" SamplesPerPixel="1" />"#,
                escape_xml(&label.to_string())
            )
        })
        .join("");
    let tiff_data = (0..size_c)
        .map(|index| {
            format!(
                r#"<TiffData IFD="{index}" PlaneCount="1" FirstC="{index}" FirstT="0" FirstZ="0" />"#
            )
        })
        .join("");
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<OME xmlns="{ns}" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
            r#"xsi:schemaLocation="{ns} {ns}/ome.xsd" Creator="{creator}">"#,
            r#"<Image ID="Image:0" Name="Image0">"#,
            r#"<Pixels ID="Pixels:0" DimensionOrder="XYCZT" Type="uint8" SignificantBits="8" "#,
            r#"SizeX="{size_x}" SizeY="{size_y}" SizeC="{size_c}" SizeZ="1" SizeT="1" "#,
            r#"PhysicalSizeX="{pixel_size}" PhysicalSizeXUnit="µm" "#,
            r#"PhysicalSizeY="{pixel_size}" PhysicalSizeYUnit="µm">"#,
            "{channels}{tiff_data}",
            "</Pixels></Image></OME>"
        ),
        ns = OME_NAMESPACE,
        creator = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION")),
        size_x = size_x,
        size_y = size_y,
        size_c = size_c,
        pixel_size = pixel_size,
        channels = channels,
        tiff_data = tiff_data,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::assign_channel_colors;

    #[test]
    fn ome_xml_channels() {
        let labels = assign_channel_colors(&["DAPI", "CD<3>"]).unwrap();
        let xml = ome_xml(&labels, [2, 30, 40], 0.2125);
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?><OME "#));
        assert!(xml.contains(r#"DimensionOrder="XYCZT" Type="uint8""#));
        assert!(xml.contains(r#"SizeX="40" SizeY="30" SizeC="2" SizeZ="1" SizeT="1""#));
        assert!(xml.contains(r#"PhysicalSizeX="0.2125" PhysicalSizeXUnit="µm""#));
        assert!(xml.contains(r#"<Channel ID="Channel:0:0" Name="DAPI" SamplesPerPixel="1" />"#));
        assert!(xml.contains(r#"Name="CD&lt;3&gt; (color=488)""#));
        assert!(xml.contains(r#"<TiffData IFD="1" PlaneCount="1" FirstC="1""#));
        assert!(xml.ends_with("</Pixels></Image></OME>"));
    }

    #[test]
    fn xml_escaping() {
        assert_eq!(escape_xml(r#"a&b"c'd"#), "a&amp;b&quot;c&apos;d");
    }
}
